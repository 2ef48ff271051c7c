//! Session coordinator: the single owner of the at-most-one cast session.
//!
//! Every session-modifying operation goes through one lock, so concurrent
//! `start` calls serialize and a `control` observed to succeed
//! happened-before any later `status`. The coordinator translates the
//! uniform control vocabulary into per-protocol client calls and caches
//! position/duration/paused between status refreshes.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::airplay_client::AirPlayClient;
use crate::castv2::ChromecastClient;
use crate::dlna_renderer::DlnaRenderer;
use crate::errors::CastControlError;
use crate::model::{mime_for_url, CastStatus, DeviceInfo, DeviceType, SessionState};
use crate::registry::SharedDirectory;

/// The protocol client of the active session.
pub enum ClientHandle {
    Chromecast(ChromecastClient),
    Dlna(DlnaRenderer),
    AirPlay(AirPlayClient),
}

struct ActiveSession {
    device: DeviceInfo,
    media_url: String,
    position: f64,
    duration: f64,
    paused: bool,
    state: SessionState,
    client: ClientHandle,
}

pub struct SessionCoordinator {
    directory: SharedDirectory,
    session: Option<ActiveSession>,
}

pub type SharedCoordinator = Arc<Mutex<SessionCoordinator>>;

pub fn new_shared_coordinator(directory: SharedDirectory) -> SharedCoordinator {
    Arc::new(Mutex::new(SessionCoordinator::new(directory)))
}

impl SessionCoordinator {
    pub fn new(directory: SharedDirectory) -> Self {
        Self {
            directory,
            session: None,
        }
    }

    /// Starts casting `media_url` on `device_id`.
    ///
    /// Any prior session is stopped first (its teardown errors are
    /// swallowed). On error no session is left behind; on success the
    /// session is live in buffering/playing state.
    pub fn start(
        &mut self,
        device_id: &str,
        media_url: &str,
        start_position: Option<f64>,
    ) -> Result<(), CastControlError> {
        if self.session.is_some() {
            if let Err(e) = self.stop() {
                warn!("Stopping prior session failed: {}", e);
            }
        }

        let device = self
            .directory
            .lock()
            .unwrap()
            .get(device_id)
            .ok_or_else(|| CastControlError::DeviceNotFound(device_id.to_string()))?;

        let start = start_position.unwrap_or(0.0).max(0.0);
        info!(
            device = %device.id,
            media_url = media_url,
            start = start,
            "Starting cast session"
        );

        let client = match self.open_session(&device, media_url, start) {
            Ok(client) => client,
            Err(e) => {
                // open_session tears its half-built client down on the way
                // out; nothing else to clean here.
                return Err(e);
            }
        };

        self.session = Some(ActiveSession {
            device,
            media_url: media_url.to_string(),
            position: start,
            duration: 0.0,
            paused: false,
            state: SessionState::Buffering,
            client,
        });
        Ok(())
    }

    /// Routes one uniform control action to the active client.
    pub fn control(&mut self, action: &str, value: Option<f64>) -> Result<(), CastControlError> {
        if action == "stop" {
            return self.stop();
        }

        let session = self.session.as_mut().ok_or(CastControlError::NotCasting)?;
        debug!(action = action, value = ?value, "Control action");

        match action {
            "play" => {
                match &session.client {
                    ClientHandle::Chromecast(client) => client.play()?,
                    ClientHandle::Dlna(renderer) => renderer.play()?,
                    ClientHandle::AirPlay(client) => client.play()?,
                }
                session.paused = false;
                session.state = SessionState::Playing;
            }
            "pause" => {
                match &session.client {
                    ClientHandle::Chromecast(client) => client.pause()?,
                    ClientHandle::Dlna(renderer) => renderer.pause()?,
                    ClientHandle::AirPlay(client) => client.pause()?,
                }
                session.paused = true;
                session.state = SessionState::Paused;
            }
            "seek" => {
                let position = value.ok_or_else(|| {
                    CastControlError::MissingValue("seek".to_string())
                })?;
                match &session.client {
                    ClientHandle::Chromecast(client) => client.seek(position)?,
                    ClientHandle::Dlna(renderer) => renderer.seek(position)?,
                    ClientHandle::AirPlay(client) => client.seek(position)?,
                }
                session.position = position.max(0.0);
            }
            "volume" => {
                let value = value.ok_or_else(|| {
                    CastControlError::MissingValue("volume".to_string())
                })?;
                let percent = value.clamp(0.0, 100.0);
                match &session.client {
                    // CASTV2 volume is a level 0..1 on the receiver.
                    ClientHandle::Chromecast(client) => client.set_volume(percent / 100.0)?,
                    // DLNA takes the integer percentage on the Master channel.
                    ClientHandle::Dlna(renderer) => {
                        renderer.set_volume(percent.round() as u16)?
                    }
                    // No volume endpoint in the AirPlay video surface;
                    // accepted as a no-op.
                    ClientHandle::AirPlay(_) => {}
                }
            }
            other => return Err(CastControlError::UnknownAction(other.to_string())),
        }
        Ok(())
    }

    /// Stops and tears down the active session. Idempotent; teardown
    /// errors are logged but never leave the session behind.
    pub fn stop(&mut self) -> Result<(), CastControlError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        info!(
            device = %session.device.id,
            media_url = session.media_url.as_str(),
            "Stopping cast session"
        );

        match &mut session.client {
            ClientHandle::Chromecast(client) => {
                // disconnect() stops the media, the receiver app and the
                // heartbeat, then joins the channel worker.
                client.disconnect();
            }
            ClientHandle::Dlna(renderer) => {
                if let Err(e) = renderer.stop() {
                    warn!("DLNA Stop failed during teardown: {}", e);
                }
            }
            ClientHandle::AirPlay(client) => {
                if let Err(e) = client.stop() {
                    warn!("AirPlay /stop failed during teardown: {}", e);
                }
                client.disconnect();
            }
        }
        // Client dropped here, after its protocol-level teardown.
        Ok(())
    }

    /// Snapshot of the current session. Never fails; protocol errors during
    /// the refresh only mean the cached values are returned as-is.
    pub fn status(&mut self) -> CastStatus {
        let Some(session) = self.session.as_mut() else {
            return CastStatus::idle();
        };

        match &session.client {
            ClientHandle::Chromecast(client) => {
                client.request_status();
                let snapshot = client.snapshot();
                if snapshot.duration > 0.0 || snapshot.position > 0.0 {
                    session.position = snapshot.position;
                    session.duration = snapshot.duration;
                }
                match snapshot.player_state.as_str() {
                    "PLAYING" => {
                        session.paused = false;
                        session.state = SessionState::Playing;
                    }
                    "PAUSED" => {
                        session.paused = true;
                        session.state = SessionState::Paused;
                    }
                    "BUFFERING" => session.state = SessionState::Buffering,
                    "IDLE" => session.state = SessionState::Stopped,
                    _ => {}
                }
                if client.is_lost() {
                    session.state = SessionState::Error;
                }
            }
            ClientHandle::Dlna(renderer) => {
                if let Ok((position, duration)) = renderer.position() {
                    session.position = position;
                    if duration > 0.0 {
                        session.duration = duration;
                    }
                }
                if let Ok(state) = renderer.transport_state() {
                    match state.as_str() {
                        "PLAYING" => {
                            session.paused = false;
                            session.state = SessionState::Playing;
                        }
                        "PAUSED_PLAYBACK" => {
                            session.paused = true;
                            session.state = SessionState::Paused;
                        }
                        "TRANSITIONING" => session.state = SessionState::Buffering,
                        "STOPPED" | "NO_MEDIA_PRESENT" => {
                            session.state = SessionState::Stopped
                        }
                        _ => {}
                    }
                }
            }
            ClientHandle::AirPlay(client) => {
                let info = client.snapshot();
                if info.duration > 0.0 {
                    session.position = info.position;
                    session.duration = info.duration;
                    session.paused = info.paused();
                    session.state = if info.paused() {
                        SessionState::Paused
                    } else {
                        SessionState::Playing
                    };
                }
            }
        }

        CastStatus {
            casting: true,
            device_id: Some(session.device.id.clone()),
            device_name: Some(session.device.name.clone()),
            position: session.position,
            duration: session.duration,
            paused: session.paused,
            state: session.state,
        }
    }

    pub fn is_casting(&self) -> bool {
        self.session.is_some()
    }

    /// Connects the matching protocol client and drives its load sequence.
    /// A failure after connect tears the half-open client down before
    /// propagating.
    fn open_session(
        &self,
        device: &DeviceInfo,
        media_url: &str,
        start: f64,
    ) -> Result<ClientHandle, CastControlError> {
        let mime = mime_for_url(media_url);
        match device.device_type {
            DeviceType::Chromecast => {
                let client = ChromecastClient::connect(&device.address, device.port)?;
                if let Err(e) = client.load_media(media_url, mime, start) {
                    let mut client = client;
                    client.disconnect();
                    return Err(e);
                }
                Ok(ClientHandle::Chromecast(client))
            }
            DeviceType::Dlna => {
                let renderer = DlnaRenderer::from_device(device)?;
                let title = title_from_url(media_url);
                renderer.load(media_url, &title, mime, start)?;
                Ok(ClientHandle::Dlna(renderer))
            }
            DeviceType::AirPlay => {
                let mut client = AirPlayClient::connect(&device.address, device.port)?;
                if let Err(e) = client.load(media_url, start) {
                    client.disconnect();
                    return Err(e);
                }
                Ok(ClientHandle::AirPlay(client))
            }
        }
    }
}

/// Last path component of the media URL, percent-decoding left alone.
fn title_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Video")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::new_shared_directory;

    #[test]
    fn control_without_session_reports_not_casting() {
        let mut coordinator = SessionCoordinator::new(new_shared_directory());
        let err = coordinator.control("play", None).unwrap_err();
        assert!(matches!(err, CastControlError::NotCasting));
        assert_eq!(err.to_string(), "Not currently casting");
    }

    #[test]
    fn session_check_precedes_action_check() {
        let mut coordinator = SessionCoordinator::new(new_shared_directory());
        let err = coordinator.control("rewind", None).unwrap_err();
        assert!(matches!(err, CastControlError::NotCasting));
    }

    #[test]
    fn start_unknown_device_fails_and_leaves_no_session() {
        let mut coordinator = SessionCoordinator::new(new_shared_directory());
        let err = coordinator
            .start("chromecast-missing", "http://h/m.mp4", None)
            .unwrap_err();
        assert!(matches!(err, CastControlError::DeviceNotFound(_)));
        assert!(!coordinator.is_casting());
        assert!(!coordinator.status().casting);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut coordinator = SessionCoordinator::new(new_shared_directory());
        assert!(coordinator.stop().is_ok());
        assert!(coordinator.stop().is_ok());
    }

    #[test]
    fn status_without_session_is_idle() {
        let mut coordinator = SessionCoordinator::new(new_shared_directory());
        let status = coordinator.status();
        assert!(!status.casting);
        assert!(status.device_id.is_none());
        assert_eq!(status.state, SessionState::Stopped);
    }

    #[test]
    fn title_from_url_takes_last_component() {
        assert_eq!(title_from_url("http://h:9876/media/movie.mp4"), "movie.mp4");
        assert_eq!(title_from_url("http://h/media/dir/ep%201.mkv?x=1"), "ep%201.mkv");
        assert_eq!(title_from_url("http://h/"), "Video");
    }
}
