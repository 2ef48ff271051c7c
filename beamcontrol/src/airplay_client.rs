//! AirPlay video backend.
//!
//! AirPlay video control is plain HTTP on port 7000: binary property lists
//! for `/play`, URL parameters for `/scrub` and `/rate`, and a property
//! list response from `/playback-info`. A per-connection session UUID is
//! carried in `X-Apple-Session-ID` on every request.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace, warn};
use ureq::Agent;
use uuid::Uuid;

use crate::errors::CastControlError;

/// Default AirPlay control port.
pub const DEFAULT_AIRPLAY_PORT: u16 = 7000;

const USER_AGENT: &str = "MediaControl/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Status poll cadence while a session is active.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long load() waits for the device to learn the media duration before
/// issuing the deferred start-position scrub.
const DURATION_PROBE_TICKS: u32 = 10;

/// Playback facts from `/playback-info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackInfo {
    pub position: f64,
    pub duration: f64,
    pub rate: f64,
}

impl PlaybackInfo {
    /// AirPlay has no explicit paused flag; rate 0 with a known duration is
    /// the paused state.
    pub fn paused(&self) -> bool {
        self.rate == 0.0 && self.duration > 0.0
    }
}

struct Shared {
    info: Mutex<PlaybackInfo>,
    stop: AtomicBool,
}

/// Client for one AirPlay endpoint.
pub struct AirPlayClient {
    base_url: String,
    session_id: String,
    agent: Agent,
    shared: Arc<Shared>,
    poller: Option<JoinHandle<()>>,
}

impl AirPlayClient {
    /// Verifies the endpoint answers `/server-info` and allocates the
    /// session UUID used for the rest of the connection.
    pub fn connect(host: &str, port: u16) -> Result<Self, CastControlError> {
        let base_url = format!("http://{}:{}", host, port);
        let session_id = Uuid::new_v4().to_string();
        let agent = build_agent();

        debug!(base_url = base_url.as_str(), "Connecting to AirPlay endpoint");

        let response = agent
            .get(format!("{}/server-info", base_url))
            .header("User-Agent", USER_AGENT)
            .header("X-Apple-Session-ID", &session_id)
            .call()
            .map_err(|e| CastControlError::ConnectionFailed(format!("{}: {}", base_url, e)))?;

        if !response.status().is_success() {
            return Err(CastControlError::airplay(format!(
                "/server-info returned HTTP {}",
                response.status()
            )));
        }

        Ok(Self {
            base_url,
            session_id,
            agent,
            shared: Arc::new(Shared {
                info: Mutex::new(PlaybackInfo::default()),
                stop: AtomicBool::new(false),
            }),
            poller: None,
        })
    }

    /// POST `/play`, then start the status poller.
    ///
    /// `Start-Position` is a fraction of the duration (0..1). The duration
    /// is unknown before the device has opened the URL, so the load always
    /// sends 0.0 and, for a non-zero start, follows up with `/scrub` once
    /// `/playback-info` reports a duration.
    pub fn load(&mut self, media_url: &str, start: f64) -> Result<(), CastControlError> {
        let body = play_request_body(media_url, 0.0)
            .map_err(|e| CastControlError::airplay(format!("plist encode: {}", e)))?;

        let response = self
            .agent
            .post(format!("{}/play", self.base_url))
            .header("User-Agent", USER_AGENT)
            .header("X-Apple-Session-ID", &self.session_id)
            .header("Content-Type", "application/x-apple-binary-plist")
            .send(&body[..])
            .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CastControlError::airplay(format!(
                "/play returned HTTP {}",
                response.status()
            )));
        }

        if start > 0.0 {
            for _ in 0..DURATION_PROBE_TICKS {
                std::thread::sleep(Duration::from_millis(500));
                match self.fetch_playback_info() {
                    Ok(info) if info.duration > 0.0 => {
                        self.seek(start)?;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        trace!("playback-info not ready yet: {}", e);
                    }
                }
            }
        }

        self.start_polling();
        Ok(())
    }

    pub fn play(&self) -> Result<(), CastControlError> {
        self.simple_post(&format!("{}/rate?value=1", self.base_url), "/rate")
    }

    pub fn pause(&self) -> Result<(), CastControlError> {
        self.simple_post(&format!("{}/rate?value=0", self.base_url), "/rate")
    }

    pub fn seek(&self, position: f64) -> Result<(), CastControlError> {
        self.simple_post(
            &format!("{}/scrub?position={}", self.base_url, position),
            "/scrub",
        )
    }

    pub fn stop(&self) -> Result<(), CastControlError> {
        self.simple_post(&format!("{}/stop", self.base_url), "/stop")
    }

    /// PUT a JPEG to the endpoint (photo sessions).
    pub fn show_photo(&self, jpeg: &[u8]) -> Result<(), CastControlError> {
        let response = self
            .agent
            .put(format!("{}/photo", self.base_url))
            .header("User-Agent", USER_AGENT)
            .header("X-Apple-Session-ID", &self.session_id)
            .header("Content-Type", "image/jpeg")
            .send(jpeg)
            .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CastControlError::airplay(format!(
                "/photo returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Cached playback facts maintained by the poll thread.
    pub fn snapshot(&self) -> PlaybackInfo {
        *self.shared.info.lock().unwrap()
    }

    /// Stops the poller and forgets the session.
    pub fn disconnect(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }

    fn start_polling(&mut self) {
        if self.poller.is_some() {
            return;
        }
        let base_url = self.base_url.clone();
        let session_id = self.session_id.clone();
        let shared = self.shared.clone();
        let agent = build_agent();

        self.poller = Some(
            std::thread::Builder::new()
                .name("airplay-poll".to_string())
                .spawn(move || {
                    while !shared.stop.load(Ordering::Relaxed) {
                        match fetch_playback_info_with(&agent, &base_url, &session_id) {
                            Ok(info) => {
                                *shared.info.lock().unwrap() = info;
                            }
                            Err(e) => {
                                trace!("AirPlay status poll failed: {}", e);
                            }
                        }
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    debug!("AirPlay status poller stopped");
                })
                .expect("failed to spawn airplay poller"),
        );
    }

    fn fetch_playback_info(&self) -> Result<PlaybackInfo, CastControlError> {
        fetch_playback_info_with(&self.agent, &self.base_url, &self.session_id)
    }

    fn simple_post(&self, url: &str, label: &str) -> Result<(), CastControlError> {
        let response = self
            .agent
            .post(url)
            .header("User-Agent", USER_AGENT)
            .header("X-Apple-Session-ID", &self.session_id)
            .send_empty()
            .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CastControlError::airplay(format!(
                "{} returned HTTP {}",
                label,
                response.status()
            )));
        }
        Ok(())
    }
}

impl Drop for AirPlayClient {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(poller) = self.poller.take() {
            if let Err(e) = poller.join() {
                warn!("AirPlay poller panicked: {:?}", e);
            }
        }
    }
}

fn build_agent() -> Agent {
    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    config.into()
}

fn fetch_playback_info_with(
    agent: &Agent,
    base_url: &str,
    session_id: &str,
) -> Result<PlaybackInfo, CastControlError> {
    let mut response = agent
        .get(format!("{}/playback-info", base_url))
        .header("User-Agent", USER_AGENT)
        .header("X-Apple-Session-ID", session_id)
        .call()
        .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(CastControlError::airplay(format!(
            "/playback-info returned HTTP {}",
            response.status()
        )));
    }

    let bytes = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| CastControlError::airplay(format!("reading /playback-info: {}", e)))?;

    parse_playback_info(&bytes)
}

fn parse_playback_info(bytes: &[u8]) -> Result<PlaybackInfo, CastControlError> {
    let value = plist::Value::from_reader(Cursor::new(bytes))
        .map_err(|e| CastControlError::airplay(format!("plist decode: {}", e)))?;
    let dict = value
        .as_dictionary()
        .ok_or_else(|| CastControlError::airplay("playback-info is not a dictionary"))?;

    Ok(PlaybackInfo {
        position: number(dict.get("position")),
        duration: number(dict.get("duration")),
        rate: number(dict.get("rate")),
    })
}

fn number(value: Option<&plist::Value>) -> f64 {
    match value {
        Some(plist::Value::Real(r)) => *r,
        Some(plist::Value::Integer(i)) => i.as_signed().map(|v| v as f64).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn play_request_body(media_url: &str, start_fraction: f64) -> Result<Vec<u8>, plist::Error> {
    let mut dict = plist::Dictionary::new();
    dict.insert(
        "Content-Location".to_string(),
        plist::Value::String(media_url.to_string()),
    );
    dict.insert(
        "Start-Position".to_string(),
        plist::Value::Real(start_fraction),
    );

    let mut body = Vec::new();
    plist::Value::Dictionary(dict).to_writer_binary(Cursor::new(&mut body))?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_body_is_binary_plist_with_expected_keys() {
        let body = play_request_body("http://10.0.0.2:9876/media/movie.mp4", 0.0).unwrap();
        assert!(body.starts_with(b"bplist"));

        let value = plist::Value::from_reader(Cursor::new(&body[..])).unwrap();
        let dict = value.as_dictionary().unwrap();
        assert_eq!(
            dict.get("Content-Location").and_then(|v| v.as_string()),
            Some("http://10.0.0.2:9876/media/movie.mp4")
        );
        assert_eq!(
            dict.get("Start-Position").and_then(|v| v.as_real()),
            Some(0.0)
        );
    }

    #[test]
    fn start_position_stays_a_fraction() {
        // 90 seconds into the film is NOT 0.9; the field is a fraction of
        // duration, so anything the caller passes must already be 0..1.
        let body = play_request_body("http://h/m.mp4", 0.25).unwrap();
        let value = plist::Value::from_reader(Cursor::new(&body[..])).unwrap();
        let fraction = value
            .as_dictionary()
            .unwrap()
            .get("Start-Position")
            .and_then(|v| v.as_real())
            .unwrap();
        assert!((0.0..=1.0).contains(&fraction));
        assert_eq!(fraction, 0.25);
    }

    #[test]
    fn playback_info_parses_reals_and_integers() {
        let mut dict = plist::Dictionary::new();
        dict.insert("position".to_string(), plist::Value::Real(12.5));
        dict.insert("duration".to_string(), plist::Value::Integer(600.into()));
        dict.insert("rate".to_string(), plist::Value::Integer(0.into()));
        let mut bytes = Vec::new();
        plist::Value::Dictionary(dict)
            .to_writer_binary(Cursor::new(&mut bytes))
            .unwrap();

        let info = parse_playback_info(&bytes).unwrap();
        assert_eq!(info.position, 12.5);
        assert_eq!(info.duration, 600.0);
        assert!(info.paused());
    }

    #[test]
    fn rate_nonzero_is_not_paused() {
        let info = PlaybackInfo {
            position: 1.0,
            duration: 100.0,
            rate: 1.0,
        };
        assert!(!info.paused());
    }
}
