//! Chromecast channel client.
//!
//! One worker thread owns the TLS stream for the whole life of the channel.
//! Commands arrive over a crossbeam channel and are executed in order, so
//! outbound writes are serialized by construction and heartbeat PINGs can
//! never interleave with a user message mid-frame. The worker reads with a
//! short socket timeout, which doubles as the tick for the heartbeat
//! schedule and for shutdown observation.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use native_tls::{TlsConnector, TlsStream};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use super::codec::{decode_body, encode_frame, CastMessage};
use super::{
    DEFAULT_MEDIA_RECEIVER_APP_ID, NAMESPACE_CONNECTION, NAMESPACE_HEARTBEAT, NAMESPACE_MEDIA,
    NAMESPACE_RECEIVER,
};
use crate::errors::CastControlError;

const SENDER_ID: &str = "sender-0";
const RECEIVER_ID: &str = "receiver-0";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket read timeout; one worker tick.
const READ_TICK: Duration = Duration::from_millis(400);
/// Ceiling for one queued command, LAUNCH+LOAD included.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// How long to wait for the RECEIVER_STATUS / MEDIA_STATUS answering us.
const STATUS_TIMEOUT: Duration = Duration::from_secs(8);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Channel is dead this long after the first unanswered PING.
const HEARTBEAT_GRACE: Duration = Duration::from_secs(15);

type Reply = Sender<Result<(), CastControlError>>;

enum Command {
    Load {
        url: String,
        content_type: String,
        start: f64,
        reply: Reply,
    },
    Play {
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    Seek {
        position: f64,
        reply: Reply,
    },
    SetVolume {
        level: f64,
        reply: Reply,
    },
    RequestStatus,
    Disconnect {
        reply: Reply,
    },
}

/// Playback facts extracted from MEDIA_STATUS frames.
#[derive(Debug, Default, Clone)]
pub struct MediaSnapshot {
    pub position: f64,
    pub duration: f64,
    pub player_state: String,
}

struct Shared {
    lost: AtomicBool,
    snapshot: Mutex<MediaSnapshot>,
}

/// Handle to an open CASTV2 channel.
pub struct ChromecastClient {
    cmd_tx: Sender<Command>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ChromecastClient {
    /// Establishes TCP+TLS, opens the virtual connection to the device
    /// receiver and starts the channel worker (and with it the heartbeat).
    ///
    /// Chromecast devices present self-signed certificates; certificate and
    /// hostname verification are disabled for this channel only.
    pub fn connect(host: &str, port: u16) -> Result<Self, CastControlError> {
        let address = format!("{}:{}", host, port);
        debug!(address = address.as_str(), "Connecting to Chromecast");

        let socket_addr = address
            .to_socket_addrs()
            .map_err(|e| CastControlError::InvalidAddress(format!("{}: {}", address, e)))?
            .next()
            .ok_or_else(|| CastControlError::InvalidAddress(address.clone()))?;

        let tcp = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
            .map_err(|e| CastControlError::ConnectionFailed(format!("{}: {}", address, e)))?;
        tcp.set_read_timeout(Some(READ_TICK))
            .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;
        tcp.set_write_timeout(Some(CONNECT_TIMEOUT))
            .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;

        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| CastControlError::ConnectionFailed(format!("TLS connector: {}", e)))?;
        let stream = connector
            .connect(host, tcp)
            .map_err(|e| CastControlError::ConnectionFailed(format!("TLS handshake: {}", e)))?;

        let shared = Arc::new(Shared {
            lost: AtomicBool::new(false),
            snapshot: Mutex::new(MediaSnapshot::default()),
        });

        let mut channel = Channel::new(stream, shared.clone());
        channel
            .send_json(
                NAMESPACE_CONNECTION,
                RECEIVER_ID,
                json!({"type": "CONNECT", "origin": {}}),
            )
            .map_err(|e| CastControlError::ConnectionFailed(e))?;

        let (cmd_tx, cmd_rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name("castv2-channel".to_string())
            .spawn(move || channel.run(cmd_rx))
            .map_err(|e| CastControlError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            cmd_tx,
            shared,
            worker: Some(worker),
        })
    }

    pub fn load_media(
        &self,
        url: &str,
        content_type: &str,
        start: f64,
    ) -> Result<(), CastControlError> {
        self.roundtrip(|reply| Command::Load {
            url: url.to_string(),
            content_type: content_type.to_string(),
            start,
            reply,
        })
    }

    pub fn play(&self) -> Result<(), CastControlError> {
        self.roundtrip(|reply| Command::Play { reply })
    }

    pub fn pause(&self) -> Result<(), CastControlError> {
        self.roundtrip(|reply| Command::Pause { reply })
    }

    pub fn stop(&self) -> Result<(), CastControlError> {
        self.roundtrip(|reply| Command::Stop { reply })
    }

    pub fn seek(&self, position: f64) -> Result<(), CastControlError> {
        self.roundtrip(|reply| Command::Seek { position, reply })
    }

    /// Volume level 0..1 on the device receiver.
    pub fn set_volume(&self, level: f64) -> Result<(), CastControlError> {
        self.roundtrip(|reply| Command::SetVolume {
            level: level.clamp(0.0, 1.0),
            reply,
        })
    }

    /// Fire-and-forget GET_STATUS; the answering MEDIA_STATUS refreshes the
    /// snapshot asynchronously.
    pub fn request_status(&self) {
        let _ = self.cmd_tx.send(Command::RequestStatus);
    }

    /// Last playback facts observed on the channel.
    pub fn snapshot(&self) -> MediaSnapshot {
        self.shared.snapshot.lock().unwrap().clone()
    }

    /// True once the heartbeat policy (or a socket error) declared the
    /// channel dead.
    pub fn is_lost(&self) -> bool {
        self.shared.lost.load(Ordering::Relaxed)
    }

    /// Closes the virtual connections, stops the receiver app and tears the
    /// channel down. Idempotent; errors during teardown are logged by the
    /// worker, not surfaced.
    pub fn disconnect(&mut self) {
        let (tx, rx) = bounded(1);
        if self.cmd_tx.send(Command::Disconnect { reply: tx }).is_ok() {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn roundtrip<F>(&self, make: F) -> Result<(), CastControlError>
    where
        F: FnOnce(Reply) -> Command,
    {
        if self.is_lost() {
            return Err(CastControlError::ConnectionFailed(
                "CASTV2 channel lost".to_string(),
            ));
        }
        let (tx, rx) = bounded(1);
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| CastControlError::ConnectionFailed("CASTV2 channel closed".to_string()))?;
        match rx.recv_timeout(COMMAND_TIMEOUT) {
            Ok(result) => result,
            Err(_) if self.is_lost() => Err(CastControlError::ConnectionFailed(
                "CASTV2 channel lost".to_string(),
            )),
            Err(_) => Err(CastControlError::Timeout(
                "CASTV2 command timed out".to_string(),
            )),
        }
    }
}

impl Drop for ChromecastClient {
    fn drop(&mut self) {
        // Dropping the command sender makes the worker exit on its next
        // tick even if disconnect() was never called.
        if let Some(worker) = self.worker.take() {
            let (tx, _rx) = bounded(1);
            let _ = self.cmd_tx.send(Command::Disconnect { reply: tx });
            let _ = worker.join();
        }
    }
}

/// The channel state owned by the worker thread.
struct Channel {
    stream: TlsStream<TcpStream>,
    shared: Arc<Shared>,
    /// Strictly increasing per channel, restarting at 1 on reconnect.
    next_request_id: i64,
    transport_id: Option<String>,
    receiver_session_id: Option<String>,
    media_session_id: Option<i64>,
    /// Inbound reassembly buffer (frames can split across read ticks).
    pending: Vec<u8>,
    last_ping_sent: Instant,
    first_unanswered_ping: Option<Instant>,
}

enum Flow {
    Continue,
    Exit,
}

impl Channel {
    fn new(stream: TlsStream<TcpStream>, shared: Arc<Shared>) -> Self {
        Self {
            stream,
            shared,
            next_request_id: 1,
            transport_id: None,
            receiver_session_id: None,
            media_session_id: None,
            pending: Vec::new(),
            last_ping_sent: Instant::now(),
            first_unanswered_ping: None,
        }
    }

    fn run(mut self, cmd_rx: Receiver<Command>) {
        loop {
            match cmd_rx.try_recv() {
                Ok(command) => match self.handle_command(command) {
                    Flow::Exit => break,
                    Flow::Continue => {}
                },
                Err(crossbeam_channel::TryRecvError::Empty) => {}
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    self.close_quietly();
                    break;
                }
            }

            match self.read_tick() {
                Ok(Some(message)) => self.dispatch(message),
                Ok(None) => {}
                Err(e) => {
                    warn!("CASTV2 read error, declaring channel lost: {}", e);
                    self.mark_lost();
                    break;
                }
            }

            if let Err(e) = self.heartbeat_tick() {
                warn!("CASTV2 heartbeat failure: {}", e);
                self.mark_lost();
                break;
            }
        }
        debug!("CASTV2 channel worker stopped");
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Load {
                url,
                content_type,
                start,
                reply,
            } => {
                let result = self.load_media(&url, &content_type, start);
                let lost = result
                    .as_ref()
                    .err()
                    .map(|e| matches!(e, CastControlError::ConnectionFailed(_)))
                    .unwrap_or(false);
                let _ = reply.send(result);
                if lost {
                    self.mark_lost();
                    return Flow::Exit;
                }
            }
            Command::Play { reply } => {
                let _ = reply.send(self.simple_media_command("PLAY"));
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.simple_media_command("PAUSE"));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.simple_media_command("STOP"));
            }
            Command::Seek { position, reply } => {
                let result = match (self.transport_id.clone(), self.media_session_id) {
                    (Some(transport), Some(media_session)) => {
                        let request_id = self.alloc_request_id();
                        self.send_json(
                            NAMESPACE_MEDIA,
                            &transport,
                            json!({
                                "type": "SEEK",
                                "requestId": request_id,
                                "mediaSessionId": media_session,
                                "currentTime": position,
                                "resumeState": "PLAYBACK_START",
                            }),
                        )
                        .map_err(CastControlError::ConnectionFailed)
                    }
                    _ => Err(CastControlError::chromecast("No active media session")),
                };
                let _ = reply.send(result);
            }
            Command::SetVolume { level, reply } => {
                let request_id = self.alloc_request_id();
                let result = self
                    .send_json(
                        NAMESPACE_RECEIVER,
                        RECEIVER_ID,
                        json!({
                            "type": "SET_VOLUME",
                            "requestId": request_id,
                            "volume": {"level": level},
                        }),
                    )
                    .map_err(CastControlError::ConnectionFailed);
                let _ = reply.send(result);
            }
            Command::RequestStatus => {
                if let (Some(transport), Some(media_session)) =
                    (self.transport_id.clone(), self.media_session_id)
                {
                    let request_id = self.alloc_request_id();
                    let _ = self.send_json(
                        NAMESPACE_MEDIA,
                        &transport,
                        json!({
                            "type": "GET_STATUS",
                            "requestId": request_id,
                            "mediaSessionId": media_session,
                        }),
                    );
                }
            }
            Command::Disconnect { reply } => {
                self.close_quietly();
                let _ = reply.send(Ok(()));
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// LAUNCH (when no app is running yet) then LOAD.
    fn load_media(
        &mut self,
        url: &str,
        content_type: &str,
        start: f64,
    ) -> Result<(), CastControlError> {
        if self.transport_id.is_none() {
            self.launch_default_receiver()?;
        }
        let transport = self
            .transport_id
            .clone()
            .ok_or_else(|| CastControlError::chromecast("No transportId after LAUNCH"))?;

        let request_id = self.alloc_request_id();
        self.send_json(
            NAMESPACE_MEDIA,
            &transport,
            json!({
                "type": "LOAD",
                "requestId": request_id,
                "autoplay": true,
                "currentTime": start,
                "media": {
                    "contentId": url,
                    "contentType": content_type,
                    "streamType": "BUFFERED",
                },
            }),
        )
        .map_err(CastControlError::ConnectionFailed)?;

        self.await_media_session(request_id)?;
        Ok(())
    }

    fn launch_default_receiver(&mut self) -> Result<(), CastControlError> {
        let request_id = self.alloc_request_id();
        self.send_json(
            NAMESPACE_RECEIVER,
            RECEIVER_ID,
            json!({
                "type": "LAUNCH",
                "requestId": request_id,
                "appId": DEFAULT_MEDIA_RECEIVER_APP_ID,
            }),
        )
        .map_err(CastControlError::ConnectionFailed)?;

        self.await_receiver_app(request_id)?;

        let transport = self
            .transport_id
            .clone()
            .ok_or_else(|| CastControlError::chromecast("RECEIVER_STATUS carried no transportId"))?;

        // Open the virtual connection to the launched app before talking to
        // it on the media namespace.
        self.send_json(
            NAMESPACE_CONNECTION,
            &transport,
            json!({"type": "CONNECT", "origin": {}}),
        )
        .map_err(CastControlError::ConnectionFailed)?;
        Ok(())
    }

    /// Waits for the RECEIVER_STATUS answering `request_id`; falls back to
    /// any status that already shows the Default Media Receiver when the
    /// correlated answer never arrives before the deadline.
    fn await_receiver_app(&mut self, request_id: i64) -> Result<(), CastControlError> {
        let deadline = Instant::now() + STATUS_TIMEOUT;
        let mut fallback: Option<(String, String)> = None;

        while Instant::now() < deadline {
            self.heartbeat_tick()
                .map_err(CastControlError::ConnectionFailed)?;
            let Some(message) = self
                .read_tick()
                .map_err(CastControlError::ConnectionFailed)?
            else {
                continue;
            };
            self.dispatch(message.clone());

            if message.namespace != NAMESPACE_RECEIVER {
                continue;
            }
            let Ok(payload) = serde_json::from_str::<Value>(&message.payload) else {
                continue;
            };
            if payload.get("type").and_then(Value::as_str) != Some("RECEIVER_STATUS") {
                continue;
            }
            let matched = payload.get("requestId").and_then(Value::as_i64) == Some(request_id);
            if let Some((transport, session)) = extract_application(&payload) {
                if matched {
                    self.transport_id = Some(transport);
                    self.receiver_session_id = Some(session);
                    return Ok(());
                }
                fallback = Some((transport, session));
            }
        }

        if let Some((transport, session)) = fallback {
            debug!("LAUNCH answer not correlated; using broadcast RECEIVER_STATUS");
            self.transport_id = Some(transport);
            self.receiver_session_id = Some(session);
            return Ok(());
        }
        Err(CastControlError::Timeout(
            "No RECEIVER_STATUS after LAUNCH".to_string(),
        ))
    }

    fn await_media_session(&mut self, request_id: i64) -> Result<(), CastControlError> {
        let deadline = Instant::now() + STATUS_TIMEOUT;
        while Instant::now() < deadline {
            self.heartbeat_tick()
                .map_err(CastControlError::ConnectionFailed)?;
            let Some(message) = self
                .read_tick()
                .map_err(CastControlError::ConnectionFailed)?
            else {
                continue;
            };
            self.dispatch(message.clone());

            if message.namespace != NAMESPACE_MEDIA {
                continue;
            }
            let Ok(payload) = serde_json::from_str::<Value>(&message.payload) else {
                continue;
            };
            if payload.get("type").and_then(Value::as_str) != Some("MEDIA_STATUS") {
                continue;
            }
            let matched = payload.get("requestId").and_then(Value::as_i64) == Some(request_id);
            if self.media_session_id.is_some() && matched {
                return Ok(());
            }
            if self.media_session_id.is_some() {
                // Unsolicited status already carried the session; good
                // enough when the correlated answer is slow.
                return Ok(());
            }
        }
        if self.media_session_id.is_some() {
            return Ok(());
        }
        Err(CastControlError::Timeout(
            "No MEDIA_STATUS after LOAD".to_string(),
        ))
    }

    fn simple_media_command(&mut self, command_type: &str) -> Result<(), CastControlError> {
        let (transport, media_session) = match (self.transport_id.clone(), self.media_session_id) {
            (Some(t), Some(m)) => (t, m),
            _ => return Err(CastControlError::chromecast("No active media session")),
        };
        let request_id = self.alloc_request_id();
        self.send_json(
            NAMESPACE_MEDIA,
            &transport,
            json!({
                "type": command_type,
                "requestId": request_id,
                "mediaSessionId": media_session,
            }),
        )
        .map_err(CastControlError::ConnectionFailed)
    }

    fn alloc_request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn send_json(
        &mut self,
        namespace: &str,
        destination_id: &str,
        payload: Value,
    ) -> Result<(), String> {
        let message = CastMessage::new(
            SENDER_ID,
            destination_id,
            namespace,
            payload.to_string(),
        );
        trace!(namespace = namespace, destination = destination_id, "CASTV2 send");
        let frame =
            encode_frame(&message).map_err(|e| format!("failed to encode cast frame: {}", e))?;
        self.stream
            .write_all(&frame)
            .map_err(|e| format!("failed to send cast frame: {}", e))
    }

    /// One read tick: pulls whatever bytes are available into the pending
    /// buffer and pops at most one complete frame. Frames regularly split
    /// across ticks; the buffer carries the remainder.
    fn read_tick(&mut self) -> Result<Option<CastMessage>, String> {
        if let Some(message) = self.pop_frame()? {
            return Ok(Some(message));
        }

        let mut buf = [0u8; 8192];
        match self.stream.read(&mut buf) {
            Ok(0) => return Err("peer closed the CASTV2 channel".to_string()),
            Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(None);
            }
            Err(e) => return Err(format!("failed to read cast frame: {}", e)),
        }

        self.pop_frame()
    }

    fn pop_frame(&mut self) -> Result<Option<CastMessage>, String> {
        if self.pending.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(self.pending[..4].try_into().unwrap()) as usize;
        if self.pending.len() < 4 + len {
            return Ok(None);
        }
        let body: Vec<u8> = self.pending.drain(..4 + len).skip(4).collect();
        let message =
            decode_body(&body).map_err(|e| format!("failed to decode cast frame: {}", e))?;
        Ok(Some(message))
    }

    fn dispatch(&mut self, message: CastMessage) {
        match message.namespace.as_str() {
            NAMESPACE_HEARTBEAT => {
                let Ok(payload) = serde_json::from_str::<Value>(&message.payload) else {
                    return;
                };
                match payload.get("type").and_then(Value::as_str) {
                    Some("PING") => {
                        let _ = self.send_json(
                            NAMESPACE_HEARTBEAT,
                            RECEIVER_ID,
                            json!({"type": "PONG"}),
                        );
                    }
                    Some("PONG") => {
                        self.first_unanswered_ping = None;
                    }
                    _ => {}
                }
            }
            NAMESPACE_RECEIVER => {
                let Ok(payload) = serde_json::from_str::<Value>(&message.payload) else {
                    return;
                };
                if payload.get("type").and_then(Value::as_str) == Some("RECEIVER_STATUS") {
                    if let Some((transport, session)) = extract_application(&payload) {
                        self.transport_id = Some(transport);
                        self.receiver_session_id = Some(session);
                    }
                }
            }
            NAMESPACE_MEDIA => {
                let Ok(payload) = serde_json::from_str::<Value>(&message.payload) else {
                    return;
                };
                if payload.get("type").and_then(Value::as_str) == Some("MEDIA_STATUS") {
                    self.apply_media_status(&payload);
                }
            }
            other => {
                trace!(namespace = other, "Ignoring CASTV2 message");
            }
        }
    }

    fn apply_media_status(&mut self, payload: &Value) {
        let Some(status) = payload
            .get("status")
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
        else {
            return;
        };

        if let Some(media_session) = status.get("mediaSessionId").and_then(Value::as_i64) {
            self.media_session_id = Some(media_session);
        }

        let mut snapshot = self.shared.snapshot.lock().unwrap();
        if let Some(position) = status.get("currentTime").and_then(Value::as_f64) {
            snapshot.position = position;
        }
        if let Some(duration) = status
            .get("media")
            .and_then(|m| m.get("duration"))
            .and_then(Value::as_f64)
        {
            snapshot.duration = duration;
        }
        if let Some(state) = status.get("playerState").and_then(Value::as_str) {
            snapshot.player_state = state.to_string();
        }
    }

    /// PING every 5 seconds; 15 seconds after the first unanswered PING the
    /// channel is declared lost.
    fn heartbeat_tick(&mut self) -> Result<(), String> {
        if let Some(first) = self.first_unanswered_ping {
            if first.elapsed() >= HEARTBEAT_GRACE {
                return Err(format!(
                    "no PONG for {:.0}s, peer unresponsive",
                    first.elapsed().as_secs_f64()
                ));
            }
        }
        if self.last_ping_sent.elapsed() >= HEARTBEAT_INTERVAL {
            self.send_json(NAMESPACE_HEARTBEAT, RECEIVER_ID, json!({"type": "PING"}))?;
            self.last_ping_sent = Instant::now();
            if self.first_unanswered_ping.is_none() {
                self.first_unanswered_ping = Some(self.last_ping_sent);
            }
        }
        Ok(())
    }

    /// Best-effort teardown: stop playback and the receiver app, close both
    /// virtual connections. Failures here only get logged.
    fn close_quietly(&mut self) {
        if let (Some(transport), Some(media_session)) =
            (self.transport_id.clone(), self.media_session_id)
        {
            let request_id = self.alloc_request_id();
            let _ = self.send_json(
                NAMESPACE_MEDIA,
                &transport,
                json!({"type": "STOP", "requestId": request_id, "mediaSessionId": media_session}),
            );
        }
        if let Some(session) = self.receiver_session_id.clone() {
            let request_id = self.alloc_request_id();
            let _ = self.send_json(
                NAMESPACE_RECEIVER,
                RECEIVER_ID,
                json!({"type": "STOP", "requestId": request_id, "sessionId": session}),
            );
        }
        if let Some(transport) = self.transport_id.clone() {
            let _ = self.send_json(NAMESPACE_CONNECTION, &transport, json!({"type": "CLOSE"}));
        }
        let _ = self.send_json(NAMESPACE_CONNECTION, RECEIVER_ID, json!({"type": "CLOSE"}));
        self.transport_id = None;
        self.receiver_session_id = None;
        self.media_session_id = None;
    }

    fn mark_lost(&mut self) {
        self.shared.lost.store(true, Ordering::Relaxed);
    }
}

fn extract_application(payload: &Value) -> Option<(String, String)> {
    let applications = payload
        .get("status")?
        .get("applications")?
        .as_array()?;
    for app in applications {
        let transport = app.get("transportId").and_then(Value::as_str);
        let session = app.get("sessionId").and_then(Value::as_str);
        if let (Some(transport), Some(session)) = (transport, session) {
            return Some((transport.to_string(), session.to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_application_reads_first_complete_entry() {
        let payload: Value = serde_json::from_str(
            r#"{
                "type": "RECEIVER_STATUS",
                "requestId": 1,
                "status": {
                    "applications": [
                        {"appId": "CC1AD845", "transportId": "web-5", "sessionId": "s-9"}
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            extract_application(&payload),
            Some(("web-5".to_string(), "s-9".to_string()))
        );
    }

    #[test]
    fn extract_application_skips_incomplete_entries() {
        let payload: Value = serde_json::from_str(
            r#"{"status": {"applications": [{"appId": "X"}, {"transportId": "t", "sessionId": "s"}]}}"#,
        )
        .unwrap();
        assert_eq!(
            extract_application(&payload),
            Some(("t".to_string(), "s".to_string()))
        );
    }

    #[test]
    fn heartbeat_declares_loss_after_grace() {
        // Exercised on the pure state: the deadline arithmetic alone decides
        // when the channel is lost.
        let first = Instant::now() - HEARTBEAT_GRACE;
        assert!(first.elapsed() >= HEARTBEAT_GRACE);
        let fresh = Instant::now();
        assert!(fresh.elapsed() < HEARTBEAT_GRACE);
    }
}
