//! Device directory, discovery, protocol clients and the session
//! coordinator of the Beamer cast helper.

pub mod airplay_client;
pub mod avtransport_client;
pub mod castv2;
pub mod coordinator;
pub mod discovery;
pub mod dlna_renderer;
pub mod errors;
pub mod model;
pub mod registry;
pub mod rendering_control_client;
pub mod soap_client;
pub mod time_utils;

#[cfg(feature = "beamserver")]
pub mod beamserver_ext;

#[cfg(feature = "beamserver")]
pub use beamserver_ext::CastControlExt;

pub use airplay_client::AirPlayClient;
pub use avtransport_client::{AvTransportClient, PositionInfo, TransportInfo};
pub use castv2::ChromecastClient;
pub use coordinator::{new_shared_coordinator, SessionCoordinator, SharedCoordinator};
pub use discovery::DiscoveryManager;
pub use dlna_renderer::DlnaRenderer;
pub use errors::CastControlError;
pub use model::{
    CastStatus, DeviceCapabilities, DeviceId, DeviceInfo, DeviceType, SessionState,
};
pub use registry::{new_shared_directory, DeviceDirectory, SharedDirectory};
pub use rendering_control_client::RenderingControlClient;
pub use soap_client::invoke_upnp_action;
