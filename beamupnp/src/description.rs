//! UPnP device-description retrieval and extraction.
//!
//! SSDP only hands us a LOCATION URL; the interesting facts (friendly name,
//! UDN, service control URLs) live in the description XML behind it.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use url::Url;
use xmltree::{Element, XMLNode};

/// How long a description fetch may take before the device is skipped.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// The facts Beamer keeps from a MediaRenderer description document.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub friendly_name: String,
    pub udn: String,
    /// Description URL with its last path component stripped.
    pub base_url: String,
    pub port: u16,
    pub av_transport_control_url: Option<String>,
    pub rendering_control_control_url: Option<String>,
}

/// Fetches and parses the description document at `location`.
pub fn fetch_device_description(location: &str) -> Result<DeviceDescription> {
    debug!(location = location, "Fetching device description");

    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(FETCH_TIMEOUT))
        .build();
    let agent: Agent = config.into();

    let mut response = agent
        .get(location)
        .call()
        .with_context(|| format!("HTTP error fetching device description {}", location))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Device description {} returned HTTP {}",
            location,
            response.status()
        ));
    }

    let body = response
        .body_mut()
        .read_to_string()
        .context("Failed to read device description body")?;

    parse_device_description(location, body.as_bytes())
}

/// Parses a description document. Split from the fetch so it is testable
/// without a device on the network.
pub fn parse_device_description(location: &str, xml: &[u8]) -> Result<DeviceDescription> {
    let root = Element::parse(xml).context("Malformed device description XML")?;

    let friendly_name = find_descendant_text(&root, "friendlyName")
        .ok_or_else(|| anyhow!("Device description has no friendlyName"))?;
    let udn = find_descendant_text(&root, "UDN")
        .ok_or_else(|| anyhow!("Device description has no UDN"))?;

    let url = Url::parse(location).with_context(|| format!("Invalid LOCATION {}", location))?;
    let port = url.port_or_known_default().unwrap_or(80);
    let base_url = strip_last_path_component(&url);

    let mut av_transport_control_url = None;
    let mut rendering_control_control_url = None;
    for service in collect_descendants(&root, "service") {
        let Some(service_type) = child_text(service, "serviceType") else {
            continue;
        };
        let Some(control_url) = child_text(service, "controlURL") else {
            continue;
        };
        let resolved = url
            .join(&control_url)
            .map(|u| u.to_string())
            .unwrap_or(control_url);
        if service_type.contains(":AVTransport:") {
            av_transport_control_url = Some(resolved);
        } else if service_type.contains(":RenderingControl:") {
            rendering_control_control_url = Some(resolved);
        }
    }

    Ok(DeviceDescription {
        friendly_name,
        udn,
        base_url,
        port,
        av_transport_control_url,
        rendering_control_control_url,
    })
}

fn strip_last_path_component(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    if let Ok(mut segments) = base.path_segments_mut() {
        segments.pop();
        segments.push("");
    }
    base.to_string()
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn find_descendant_text(elem: &Element, name: &str) -> Option<String> {
    if elem.name == name {
        return elem
            .get_text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
    }
    elem.children.iter().find_map(|node| match node {
        XMLNode::Element(child) => find_descendant_text(child, name),
        _ => None,
    })
}

fn collect_descendants<'a>(elem: &'a Element, name: &str) -> Vec<&'a Element> {
    let mut out = Vec::new();
    collect_into(elem, name, &mut out);
    out
}

fn collect_into<'a>(elem: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for node in &elem.children {
        if let XMLNode::Element(child) = node {
            if child.name == name {
                out.push(child);
            }
            collect_into(child, name, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Attic TV</friendlyName>
    <UDN>uuid:0ddba11-feed-beef</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>/AVTransport/control</controlURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <controlURL>RenderingControl/control</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn extracts_name_udn_and_control_urls() {
        let desc =
            parse_device_description("http://10.0.0.9:52235/dmr/desc.xml", DESCRIPTION.as_bytes())
                .unwrap();
        assert_eq!(desc.friendly_name, "Attic TV");
        assert_eq!(desc.udn, "uuid:0ddba11-feed-beef");
        assert_eq!(desc.base_url, "http://10.0.0.9:52235/dmr/");
        assert_eq!(desc.port, 52235);
        assert_eq!(
            desc.av_transport_control_url.as_deref(),
            Some("http://10.0.0.9:52235/AVTransport/control")
        );
        assert_eq!(
            desc.rendering_control_control_url.as_deref(),
            Some("http://10.0.0.9:52235/dmr/RenderingControl/control")
        );
    }

    #[test]
    fn default_port_is_80() {
        let desc =
            parse_device_description("http://10.0.0.9/desc.xml", DESCRIPTION.as_bytes()).unwrap();
        assert_eq!(desc.port, 80);
        assert_eq!(desc.base_url, "http://10.0.0.9/");
    }

    #[test]
    fn missing_udn_is_an_error() {
        let xml = DESCRIPTION.replace("UDN", "Udd");
        assert!(parse_device_description("http://10.0.0.9/d.xml", xml.as_bytes()).is_err());
    }
}
