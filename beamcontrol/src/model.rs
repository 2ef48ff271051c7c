use serde::{Deserialize, Serialize};

/// Stable device identifier, namespaced by protocol
/// (`chromecast-…`, `dlna-…`, `airplay-…`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which protocol family a device speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Chromecast,
    Dlna,
    AirPlay,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Chromecast => "chromecast",
            DeviceType::Dlna => "dlna",
            DeviceType::AirPlay => "airplay",
        }
    }
}

/// What a playback endpoint can render.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub max_width: u32,
    pub max_height: u32,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub hdr: bool,
    pub dolby_vision: bool,
    pub subtitle_formats: Vec<String>,
}

impl DeviceCapabilities {
    pub fn chromecast_defaults() -> Self {
        DeviceCapabilities {
            max_width: 3840,
            max_height: 2160,
            video_codecs: svec(&["h264", "hevc", "vp8", "vp9"]),
            audio_codecs: svec(&["aac", "mp3", "opus", "vorbis"]),
            hdr: true,
            dolby_vision: false,
            subtitle_formats: svec(&["vtt"]),
        }
    }

    pub fn airplay_defaults() -> Self {
        DeviceCapabilities {
            max_width: 3840,
            max_height: 2160,
            video_codecs: svec(&["h264", "hevc"]),
            audio_codecs: svec(&["aac", "ac3", "eac3"]),
            hdr: true,
            dolby_vision: true,
            subtitle_formats: svec(&["vtt"]),
        }
    }

    pub fn dlna_defaults() -> Self {
        DeviceCapabilities {
            max_width: 1920,
            max_height: 1080,
            video_codecs: svec(&["h264", "mpeg2"]),
            audio_codecs: svec(&["aac", "ac3", "mp3"]),
            hdr: false,
            dolby_vision: false,
            subtitle_formats: svec(&["srt", "vtt"]),
        }
    }
}

fn svec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A discovered playback endpoint.
///
/// `address` is a host for chromecast/airplay devices and the description
/// base URL for DLNA renderers. The optional control URLs are resolved from
/// the DLNA device description at discovery time; the protocol clients need
/// them and the description is not refetched per session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub address: String,
    pub port: u16,
    pub capabilities: DeviceCapabilities,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub av_transport_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rendering_control_url: Option<String>,
}

/// High-level session state reported on the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Error,
}

/// Snapshot returned by `GET /status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastStatus {
    pub casting: bool,
    pub device_id: Option<DeviceId>,
    pub device_name: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub state: SessionState,
}

impl CastStatus {
    pub fn idle() -> Self {
        CastStatus {
            casting: false,
            device_id: None,
            device_name: None,
            position: 0.0,
            duration: 0.0,
            paused: false,
            state: SessionState::Stopped,
        }
    }
}

/// MIME type for a media URL, by extension. Endpoints only get broad hints
/// here; the media server does its own per-file inference.
pub fn mime_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "ts" | "m2ts" => "video/mp2t",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_serializes_with_lowercase_type() {
        let device = DeviceInfo {
            id: DeviceId("chromecast-1".into()),
            name: "Bedroom".into(),
            device_type: DeviceType::Chromecast,
            address: "10.0.0.5".into(),
            port: 8009,
            capabilities: DeviceCapabilities::chromecast_defaults(),
            av_transport_url: None,
            rendering_control_url: None,
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["id"], "chromecast-1");
        assert_eq!(json["type"], "chromecast");
        assert_eq!(json["port"], 8009);
        assert!(json.get("av_transport_url").is_none());
    }

    #[test]
    fn status_uses_camel_case_keys() {
        let status = CastStatus::idle();
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("deviceId").is_some());
        assert!(json.get("deviceName").is_some());
        assert_eq!(json["state"], "stopped");
    }

    #[test]
    fn mime_for_url_ignores_query() {
        assert_eq!(mime_for_url("http://h/media/movie.mkv?x=1"), "video/x-matroska");
        assert_eq!(mime_for_url("http://h/media/clip.webm"), "video/webm");
        assert_eq!(mime_for_url("http://h/media/unknown.bin"), "video/mp4");
    }
}
