use anyhow::{anyhow, Result};

use crate::soap_client::{invoke_upnp_action, SoapCallResult};
use crate::time_utils::parse_hhmmss;
use beamupnp::soap::{extract_child_text, find_child_with_suffix};

pub const AVTRANSPORT_SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

/// Client for the AVTransport:1 service of one renderer.
///
/// SOAP over HTTP is stateless, so this is just the control URL plus the
/// action vocabulary; there is no persistent channel to manage.
#[derive(Debug, Clone)]
pub struct AvTransportClient {
    pub control_url: String,
}

/// Parsed GetTransportInfo result.
#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub current_transport_state: String,
}

/// Parsed GetPositionInfo result, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct PositionInfo {
    pub rel_time: f64,
    pub track_duration: f64,
}

impl AvTransportClient {
    pub fn new(control_url: String) -> Self {
        Self { control_url }
    }

    pub fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> Result<()> {
        let args = [
            ("InstanceID", "0"),
            ("CurrentURI", uri),
            ("CurrentURIMetaData", metadata),
        ];
        let result = invoke_upnp_action(
            &self.control_url,
            AVTRANSPORT_SERVICE,
            "SetAVTransportURI",
            &args,
        )?;
        ensure_success("SetAVTransportURI", &result)
    }

    pub fn play(&self) -> Result<()> {
        let args = [("InstanceID", "0"), ("Speed", "1")];
        let result = invoke_upnp_action(&self.control_url, AVTRANSPORT_SERVICE, "Play", &args)?;
        ensure_success("Play", &result)
    }

    pub fn pause(&self) -> Result<()> {
        let args = [("InstanceID", "0")];
        let result = invoke_upnp_action(&self.control_url, AVTRANSPORT_SERVICE, "Pause", &args)?;
        ensure_success("Pause", &result)
    }

    pub fn stop(&self) -> Result<()> {
        let args = [("InstanceID", "0")];
        let result = invoke_upnp_action(&self.control_url, AVTRANSPORT_SERVICE, "Stop", &args)?;
        ensure_success("Stop", &result)
    }

    /// Seek to an absolute position expressed as `HH:MM:SS`.
    pub fn seek(&self, target: &str) -> Result<()> {
        let args = [
            ("InstanceID", "0"),
            ("Unit", "REL_TIME"),
            ("Target", target),
        ];
        let result = invoke_upnp_action(&self.control_url, AVTRANSPORT_SERVICE, "Seek", &args)?;
        ensure_success("Seek", &result)
    }

    pub fn get_position_info(&self) -> Result<PositionInfo> {
        let args = [("InstanceID", "0")];
        let result =
            invoke_upnp_action(&self.control_url, AVTRANSPORT_SERVICE, "GetPositionInfo", &args)?;
        ensure_success("GetPositionInfo", &result)?;

        let envelope = result
            .envelope
            .as_ref()
            .ok_or_else(|| anyhow!("Missing SOAP envelope in GetPositionInfo response"))?;
        let response = find_child_with_suffix(&envelope.body.content, "GetPositionInfoResponse")
            .ok_or_else(|| anyhow!("Missing GetPositionInfoResponse element in SOAP body"))?;

        // Renderers report NOT_IMPLEMENTED or 0:00:00 before a track loads;
        // both collapse to 0 seconds.
        let rel_time = extract_child_text(response, "RelTime")
            .and_then(|t| parse_hhmmss(&t).ok())
            .unwrap_or(0.0);
        let track_duration = extract_child_text(response, "TrackDuration")
            .and_then(|t| parse_hhmmss(&t).ok())
            .unwrap_or(0.0);

        Ok(PositionInfo {
            rel_time,
            track_duration,
        })
    }

    pub fn get_transport_info(&self) -> Result<TransportInfo> {
        let args = [("InstanceID", "0")];
        let result =
            invoke_upnp_action(&self.control_url, AVTRANSPORT_SERVICE, "GetTransportInfo", &args)?;
        ensure_success("GetTransportInfo", &result)?;

        let envelope = result
            .envelope
            .as_ref()
            .ok_or_else(|| anyhow!("Missing SOAP envelope in GetTransportInfo response"))?;
        let response = find_child_with_suffix(&envelope.body.content, "GetTransportInfoResponse")
            .ok_or_else(|| anyhow!("Missing GetTransportInfoResponse element in SOAP body"))?;

        let current_transport_state = extract_child_text(response, "CurrentTransportState")
            .ok_or_else(|| anyhow!("Missing CurrentTransportState in GetTransportInfo response"))?;

        Ok(TransportInfo {
            current_transport_state,
        })
    }
}

fn ensure_success(action: &str, result: &SoapCallResult) -> Result<()> {
    if result.status.is_success() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} failed with HTTP status {} and body: {}",
            action,
            result.status,
            result.raw_body.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamupnp::soap::parse_soap_envelope;

    const POSITION_RESPONSE: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetPositionInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <Track>1</Track>
      <TrackDuration>01:52:30</TrackDuration>
      <RelTime>00:04:07</RelTime>
      <AbsTime>NOT_IMPLEMENTED</AbsTime>
    </u:GetPositionInfoResponse>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn parses_position_info_to_seconds() {
        let envelope = parse_soap_envelope(POSITION_RESPONSE.as_bytes()).unwrap();
        let response =
            find_child_with_suffix(&envelope.body.content, "GetPositionInfoResponse").unwrap();
        let rel = extract_child_text(response, "RelTime").unwrap();
        let dur = extract_child_text(response, "TrackDuration").unwrap();
        assert_eq!(parse_hhmmss(&rel).unwrap(), 247.0);
        assert_eq!(parse_hhmmss(&dur).unwrap(), 6750.0);
    }

    #[test]
    fn set_av_transport_uri_body_shape() {
        // Offline check of the request body the action posts.
        let didl = beamdidl::DIDLLite::video_item(
            "movie.mp4",
            "http://host:9876/media/movie.mp4",
            "video/mp4",
        )
        .to_xml()
        .unwrap();

        let body = beamupnp::soap::build_soap_request(
            AVTRANSPORT_SERVICE,
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", "http://host:9876/media/movie.mp4"),
                ("CurrentURIMetaData", &didl),
            ],
        )
        .unwrap();

        assert!(body.contains("<u:SetAVTransportURI"));
        assert!(body.contains("<CurrentURI>http://host:9876/media/movie.mp4</CurrentURI>"));
        // Metadata is embedded escaped and survives a parse round-trip.
        assert!(body.contains("&lt;DIDL-Lite"));
        let reparsed = xmltree::Element::parse(body.as_bytes()).unwrap();
        let soap_body = reparsed.get_child("Body").unwrap();
        let action = soap_body.get_child("SetAVTransportURI").unwrap();
        let metadata = action
            .get_child("CurrentURIMetaData")
            .and_then(|e| e.get_text())
            .unwrap();
        assert_eq!(metadata, didl);
        assert!(beamdidl::DIDLLite::parse(&metadata).is_ok());
    }
}
