//! Media and subtitle routes.
//!
//! Cast endpoints pull the file themselves after receiving a media URL, and
//! they are picky HTTP clients: seeking only works when byte ranges are
//! honored exactly, and several DLNA renderers refuse URLs that do not
//! answer with `transferMode.dlna.org` / `contentFeatures.dlna.org`
//! headers. Everything here exists to make those pulls succeed.

use std::path::{Component, Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::server::{cors_headers, Server};

const TRANSFER_MODE_HEADER: HeaderName = HeaderName::from_static("transfermode.dlna.org");
const CONTENT_FEATURES_HEADER: HeaderName = HeaderName::from_static("contentfeatures.dlna.org");

const DLNA_FLAGS: &str = "DLNA.ORG_FLAGS=01700000000000000000000000000000";

#[derive(Clone)]
struct MediaState {
    media_root: PathBuf,
    subtitles_root: PathBuf,
}

/// Registers `/media/{*path}` and `/subtitles/{id}` on the server.
#[allow(async_fn_in_trait)]
pub trait MediaServeExt {
    async fn init_media_routes(&mut self, media_root: PathBuf, subtitles_root: PathBuf);
}

impl MediaServeExt for Server {
    async fn init_media_routes(&mut self, media_root: PathBuf, subtitles_root: PathBuf) {
        let state = MediaState {
            media_root,
            subtitles_root,
        };
        let router = Router::new()
            .route("/media/{*path}", get(serve_media).options(crate::server::preflight))
            .route("/subtitles/{id}", get(serve_subtitle).options(crate::server::preflight))
            .with_state(state);
        self.add_router("/", router).await;
    }
}

/// GET/HEAD handler for media files under the allow-listed root.
async fn serve_media(
    State(state): State<MediaState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let file_path = match resolve_under_root(&state.media_root, &path) {
        Ok(path) => path,
        Err(status) => return status.into_response(),
    };

    let metadata = match tokio::fs::metadata(&file_path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    let size = metadata.len();
    let mime = mime_for_path(&file_path);

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match parse_range(range_header, size) {
        RangeOutcome::Unsatisfiable => {
            debug!(path = %file_path.display(), range = ?range_header, "Unsatisfiable range");
            let mut response =
                (StatusCode::RANGE_NOT_SATISFIABLE, media_headers(mime), Body::empty())
                    .into_response();
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                format!("bytes */{}", size).parse().unwrap(),
            );
            response
        }
        RangeOutcome::Slice(start, end) => {
            let len = end - start + 1;
            let mut file = match tokio::fs::File::open(&file_path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %file_path.display(), "Cannot open media file: {}", e);
                    return StatusCode::NOT_FOUND.into_response();
                }
            };
            if let Err(e) = file.seek(std::io::SeekFrom::Start(start)).await {
                warn!(path = %file_path.display(), "Seek failed: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let stream = ReaderStream::new(file.take(len));

            let mut response = (
                StatusCode::PARTIAL_CONTENT,
                media_headers(mime),
                Body::from_stream(stream),
            )
                .into_response();
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_LENGTH, len.to_string().parse().unwrap());
            headers.insert(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, size).parse().unwrap(),
            );
            response
        }
        RangeOutcome::Full => {
            let file = match tokio::fs::File::open(&file_path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %file_path.display(), "Cannot open media file: {}", e);
                    return StatusCode::NOT_FOUND.into_response();
                }
            };
            let stream = ReaderStream::new(file);
            let mut response =
                (StatusCode::OK, media_headers(mime), Body::from_stream(stream)).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, size.to_string().parse().unwrap());
            response
        }
    }
}

/// Sidecar WebVTT subtitles by id (`/subtitles/<id>.vtt`).
async fn serve_subtitle(State(state): State<MediaState>, Path(id): Path<String>) -> Response {
    if !id.ends_with(".vtt") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let file_path = match resolve_under_root(&state.subtitles_root, &id) {
        Ok(path) => path,
        Err(status) => return status.into_response(),
    };

    match tokio::fs::read(&file_path).await {
        Ok(bytes) => {
            let mut response = (StatusCode::OK, cors_headers(), bytes).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                "text/vtt; charset=utf-8".parse().unwrap(),
            );
            response
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Normalizes a request path and anchors it under `root`.
///
/// Absolute paths and any `..` that would climb out of the root are policy
/// violations (403), not lookups that merely miss (404).
fn resolve_under_root(root: &FsPath, request_path: &str) -> Result<PathBuf, StatusCode> {
    let mut resolved = PathBuf::new();
    for component in FsPath::new(request_path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(StatusCode::FORBIDDEN);
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StatusCode::FORBIDDEN);
            }
        }
    }
    if resolved.as_os_str().is_empty() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(root.join(resolved))
}

enum RangeOutcome {
    /// No (usable) Range header: 200 with the whole file.
    Full,
    /// Inclusive byte slice: 206.
    Slice(u64, u64),
    /// 416 with `Content-Range: bytes */size`.
    Unsatisfiable,
}

/// Byte-range algebra.
///
/// Accepted forms: `bytes=S-E`, `bytes=S-`, `bytes=-N`. Multiple ranges and
/// other units are answered as if no Range was sent.
fn parse_range(header: Option<&str>, size: u64) -> RangeOutcome {
    let Some(value) = header else {
        return RangeOutcome::Full;
    };
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    if ranges.contains(',') {
        return RangeOutcome::Full;
    }
    let Some((start_raw, end_raw)) = ranges.split_once('-') else {
        return RangeOutcome::Full;
    };
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    let (start, end) = if start_raw.is_empty() {
        // Suffix form: the last N bytes.
        let Ok(suffix) = end_raw.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        (size.saturating_sub(suffix), size.saturating_sub(1))
    } else {
        let Ok(start) = start_raw.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        let end = if end_raw.is_empty() {
            size.saturating_sub(1)
        } else {
            let Ok(end) = end_raw.parse::<u64>() else {
                return RangeOutcome::Full;
            };
            end.min(size.saturating_sub(1))
        };
        (start, end)
    };

    if start > end || start >= size {
        RangeOutcome::Unsatisfiable
    } else {
        RangeOutcome::Slice(start, end)
    }
}

fn media_headers(mime: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(TRANSFER_MODE_HEADER, HeaderValue::from_static("Streaming"));
    let features = format!("DLNA.ORG_PN={};{}", dlna_profile(mime), DLNA_FLAGS);
    headers.insert(CONTENT_FEATURES_HEADER, features.parse().unwrap());
    for (name, value) in cors_headers() {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers
}

/// MIME by extension; anything unknown streams as octets.
fn mime_for_path(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "ts" | "m2ts" => "video/mp2t",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// DLNA profile advertised in contentFeatures.dlna.org, keyed on MIME.
fn dlna_profile(mime: &str) -> &'static str {
    match mime {
        "video/x-matroska" => "MATROSKA",
        _ => "AVC_MP4_HP_HD_AAC",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(header: &str, size: u64) -> Option<(u64, u64)> {
        match parse_range(Some(header), size) {
            RangeOutcome::Slice(start, end) => Some((start, end)),
            _ => None,
        }
    }

    #[test]
    fn bounded_range() {
        // bytes=0-99 of a 1024-byte file.
        assert_eq!(slice("bytes=0-99", 1024), Some((0, 99)));
    }

    #[test]
    fn open_ended_range() {
        // bytes=1000- of 1024.
        assert_eq!(slice("bytes=1000-", 1024), Some((1000, 1023)));
    }

    #[test]
    fn suffix_range() {
        // bytes=-10 of 1024: the last ten bytes.
        assert_eq!(slice("bytes=-10", 1024), Some((1014, 1023)));
    }

    #[test]
    fn suffix_longer_than_file_starts_at_zero() {
        assert_eq!(slice("bytes=-5000", 1024), Some((0, 1023)));
    }

    #[test]
    fn end_clamps_to_file_size() {
        assert_eq!(slice("bytes=1000-9999", 1024), Some((1000, 1023)));
    }

    #[test]
    fn unsatisfiable_ranges() {
        // Start beyond the file.
        assert!(matches!(
            parse_range(Some("bytes=2000-3000"), 1024),
            RangeOutcome::Unsatisfiable
        ));
        assert!(matches!(
            parse_range(Some("bytes=5-2"), 1024),
            RangeOutcome::Unsatisfiable
        ));
        assert!(matches!(
            parse_range(Some("bytes=0-0"), 0),
            RangeOutcome::Unsatisfiable
        ));
    }

    #[test]
    fn ignored_range_forms_fall_back_to_full() {
        assert!(matches!(parse_range(None, 1024), RangeOutcome::Full));
        assert!(matches!(
            parse_range(Some("bytes=0-10,20-30"), 1024),
            RangeOutcome::Full
        ));
        assert!(matches!(
            parse_range(Some("items=0-10"), 1024),
            RangeOutcome::Full
        ));
        assert!(matches!(
            parse_range(Some("bytes=abc-"), 1024),
            RangeOutcome::Full
        ));
    }

    #[test]
    fn paths_cannot_escape_the_root() {
        let root = FsPath::new("/srv/media");
        assert_eq!(
            resolve_under_root(root, "movies/movie.mp4").unwrap(),
            PathBuf::from("/srv/media/movies/movie.mp4")
        );
        assert_eq!(
            resolve_under_root(root, "a/../b.mp4").unwrap(),
            PathBuf::from("/srv/media/b.mp4")
        );
        assert_eq!(
            resolve_under_root(root, "../etc/passwd"),
            Err(StatusCode::FORBIDDEN)
        );
        assert_eq!(
            resolve_under_root(root, "/etc/passwd"),
            Err(StatusCode::FORBIDDEN)
        );
        assert_eq!(
            resolve_under_root(root, "a/../../x"),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn mime_and_dlna_profile_tables() {
        assert_eq!(mime_for_path(FsPath::new("f.mp4")), "video/mp4");
        assert_eq!(mime_for_path(FsPath::new("f.MKV")), "video/x-matroska");
        assert_eq!(mime_for_path(FsPath::new("f.m2ts")), "video/mp2t");
        assert_eq!(mime_for_path(FsPath::new("f.bin")), "application/octet-stream");
        assert_eq!(dlna_profile("video/x-matroska"), "MATROSKA");
        assert_eq!(dlna_profile("video/mp4"), "AVC_MP4_HP_HD_AAC");
        assert_eq!(dlna_profile("application/octet-stream"), "AVC_MP4_HP_HD_AAC");
    }

}
