//! CASTV2 client: the framed, TLS-wrapped, protobuf+JSON control protocol
//! spoken by Chromecast devices on TCP port 8009.

pub mod client;
pub mod codec;

pub use client::ChromecastClient;
pub use codec::CastMessage;

/// Default Chromecast control port.
pub const DEFAULT_CHROMECAST_PORT: u16 = 8009;

/// Application id of the Default Media Receiver.
pub const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";

pub const NAMESPACE_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const NAMESPACE_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const NAMESPACE_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
pub const NAMESPACE_MEDIA: &str = "urn:x-cast:com.google.cast.media";
