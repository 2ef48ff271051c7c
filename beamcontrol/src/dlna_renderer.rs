//! DLNA renderer backend.
//!
//! Wraps the AVTransport and RenderingControl clients behind the uniform
//! transport/volume vocabulary the coordinator speaks. Every operation is a
//! stateless SOAP call; the only session substate kept here is the last
//! observed transport state.

use std::sync::Mutex;

use tracing::debug;

use crate::avtransport_client::AvTransportClient;
use crate::errors::CastControlError;
use crate::model::DeviceInfo;
use crate::rendering_control_client::RenderingControlClient;
use crate::time_utils::format_hhmmss;
use beamdidl::DIDLLite;

pub struct DlnaRenderer {
    avtransport: AvTransportClient,
    rendering_control: Option<RenderingControlClient>,
    last_transport_state: Mutex<String>,
}

impl DlnaRenderer {
    /// Builds a renderer from a directory entry. The AVTransport control
    /// URL comes from the device description captured at discovery time.
    pub fn from_device(device: &DeviceInfo) -> Result<Self, CastControlError> {
        let control_url = device.av_transport_url.clone().ok_or_else(|| {
            CastControlError::InvalidAddress(format!(
                "{} has no AVTransport control URL",
                device.id
            ))
        })?;

        debug!(
            device = %device.id,
            control_url = control_url.as_str(),
            "Creating DLNA renderer"
        );

        Ok(Self {
            avtransport: AvTransportClient::new(control_url),
            rendering_control: device
                .rendering_control_url
                .clone()
                .map(RenderingControlClient::new),
            last_transport_state: Mutex::new(String::new()),
        })
    }

    /// Load sequence: SetAVTransportURI with DIDL-Lite metadata, Play, then
    /// Seek when a non-zero start position was requested.
    pub fn load(
        &self,
        media_url: &str,
        title: &str,
        mime: &str,
        start_position: f64,
    ) -> Result<(), CastControlError> {
        let metadata = DIDLLite::video_item(title, media_url, mime)
            .to_xml()
            .map_err(|e| CastControlError::dlna(format!("DIDL-Lite serialization: {}", e)))?;

        self.avtransport
            .set_av_transport_uri(media_url, &metadata)
            .map_err(as_dlna)?;
        self.avtransport.play().map_err(as_dlna)?;

        if start_position > 0.0 {
            self.avtransport
                .seek(&format_hhmmss(start_position))
                .map_err(as_dlna)?;
        }
        Ok(())
    }

    pub fn play(&self) -> Result<(), CastControlError> {
        self.avtransport.play().map_err(as_dlna)
    }

    pub fn pause(&self) -> Result<(), CastControlError> {
        self.avtransport.pause().map_err(as_dlna)
    }

    pub fn stop(&self) -> Result<(), CastControlError> {
        self.avtransport.stop().map_err(as_dlna)
    }

    pub fn seek(&self, position: f64) -> Result<(), CastControlError> {
        self.avtransport
            .seek(&format_hhmmss(position))
            .map_err(as_dlna)
    }

    /// DesiredVolume is an integer percentage on the Master channel.
    pub fn set_volume(&self, volume: u16) -> Result<(), CastControlError> {
        match &self.rendering_control {
            Some(client) => client.set_volume(volume).map_err(as_dlna),
            None => Err(CastControlError::dlna(
                "Renderer exposes no RenderingControl service",
            )),
        }
    }

    /// (position, duration) in seconds from GetPositionInfo.
    pub fn position(&self) -> Result<(f64, f64), CastControlError> {
        let info = self.avtransport.get_position_info().map_err(as_dlna)?;
        Ok((info.rel_time, info.track_duration))
    }

    /// Raw CurrentTransportState, cached for callers that last saw it.
    pub fn transport_state(&self) -> Result<String, CastControlError> {
        let info = self.avtransport.get_transport_info().map_err(as_dlna)?;
        let mut last = self.last_transport_state.lock().unwrap();
        last.clear();
        last.push_str(&info.current_transport_state);
        Ok(info.current_transport_state)
    }

    pub fn last_transport_state(&self) -> String {
        self.last_transport_state.lock().unwrap().clone()
    }
}

fn as_dlna(err: anyhow::Error) -> CastControlError {
    CastControlError::Dlna(err.to_string())
}
