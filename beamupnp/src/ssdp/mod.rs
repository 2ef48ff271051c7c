//! SSDP control-point client.
//!
//! Beamer is only ever a control point: it sends M-SEARCH and listens for
//! unicast responses (plus multicast NOTIFY alive announcements). It must
//! NOT bind UDP port 1900: that port belongs to UPnP devices answering
//! M-SEARCH, and sharing it would make the kernel load-balance datagrams
//! away from us. The client binds an ephemeral port instead.

mod client;

pub use client::{SsdpClient, SsdpEvent};

/// SSDP multicast group.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Search target for DLNA playback endpoints.
pub const MEDIA_RENDERER_ST: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
