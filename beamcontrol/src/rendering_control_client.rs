use anyhow::{anyhow, Result};

use crate::soap_client::{invoke_upnp_action, SoapCallResult};
use beamupnp::soap::{extract_child_text, find_child_with_suffix};

pub const RENDERING_CONTROL_SERVICE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

/// Client for the RenderingControl:1 service of one renderer.
#[derive(Debug, Clone)]
pub struct RenderingControlClient {
    pub control_url: String,
}

impl RenderingControlClient {
    pub fn new(control_url: String) -> Self {
        Self { control_url }
    }

    /// RenderingControl:1 SetVolume (Master channel, 0..100).
    pub fn set_volume(&self, volume: u16) -> Result<()> {
        let volume_str = volume.min(100).to_string();
        let args = [
            ("InstanceID", "0"),
            ("Channel", "Master"),
            ("DesiredVolume", volume_str.as_str()),
        ];
        let result = invoke_upnp_action(
            &self.control_url,
            RENDERING_CONTROL_SERVICE,
            "SetVolume",
            &args,
        )?;
        ensure_success("SetVolume", &result)
    }

    /// RenderingControl:1 GetVolume (Master channel).
    pub fn get_volume(&self) -> Result<u16> {
        let args = [("InstanceID", "0"), ("Channel", "Master")];
        let result = invoke_upnp_action(
            &self.control_url,
            RENDERING_CONTROL_SERVICE,
            "GetVolume",
            &args,
        )?;
        ensure_success("GetVolume", &result)?;

        let envelope = result
            .envelope
            .as_ref()
            .ok_or_else(|| anyhow!("Missing SOAP envelope in GetVolume response"))?;
        let response = find_child_with_suffix(&envelope.body.content, "GetVolumeResponse")
            .ok_or_else(|| anyhow!("Missing GetVolumeResponse element in SOAP body"))?;
        let text = extract_child_text(response, "CurrentVolume")
            .ok_or_else(|| anyhow!("Missing CurrentVolume in GetVolume response"))?;

        text.parse::<u16>()
            .map_err(|_| anyhow!("Invalid CurrentVolume value: {}", text))
    }

    /// RenderingControl:1 SetMute (Master channel).
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        let desired = if mute { "1" } else { "0" };
        let args = [
            ("InstanceID", "0"),
            ("Channel", "Master"),
            ("DesiredMute", desired),
        ];
        let result = invoke_upnp_action(
            &self.control_url,
            RENDERING_CONTROL_SERVICE,
            "SetMute",
            &args,
        )?;
        ensure_success("SetMute", &result)
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
    use beamupnp::soap::{build_soap_request, parse_soap_envelope};

    #[test]
    fn set_volume_request_targets_master_channel() {
        let body = build_soap_request(
            RENDERING_CONTROL_SERVICE,
            "SetVolume",
            &[
                ("InstanceID", "0"),
                ("Channel", "Master"),
                ("DesiredVolume", "42"),
            ],
        )
        .unwrap();
        assert!(body.contains("<u:SetVolume"));
        assert!(body.contains("<Channel>Master</Channel>"));
        assert!(body.contains("<DesiredVolume>42</DesiredVolume>"));
    }

    #[test]
    fn get_volume_response_parses() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>37</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let response = find_child_with_suffix(&envelope.body.content, "GetVolumeResponse").unwrap();
        assert_eq!(
            extract_child_text(response, "CurrentVolume").as_deref(),
            Some("37")
        );
    }
}
