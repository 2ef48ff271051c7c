use std::time::Duration;

use anyhow::{Context, Result};
use beamupnp::soap::{build_soap_request, parse_soap_envelope, SoapEnvelope};
use tracing::{debug, trace, warn};
use ureq::Agent;

/// Ceiling for a single SOAP round-trip.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - parsed SOAP envelope if parsing succeeded
pub struct SoapCallResult {
    pub status: ureq::http::StatusCode,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Invoke a UPnP SOAP action on a control URL.
///
/// - `control_url`: full HTTP URL of the service control endpoint
/// - `service_type`: service URN
/// - `action`: action name
/// - `args`: list of (name, value)
pub fn invoke_upnp_action(
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<SoapCallResult> {
    let body_xml = build_soap_request(service_type, action, args)
        .context("Failed to build SOAP request body")?;

    debug!(
        url = control_url,
        action = action,
        service_type = service_type,
        "Sending SOAP request"
    );
    trace!(body = body_xml.as_str(), "SOAP request body");

    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(DEFAULT_TIMEOUT))
        .build();
    let agent: Agent = config.into();

    let soap_action_header = format!(r#""{}#{}""#, service_type, action);

    let mut response = agent
        .post(control_url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPACTION", &soap_action_header)
        .send(body_xml)
        .with_context(|| format!("HTTP error when sending SOAP request to {}", control_url))?;

    let status = response.status();
    debug!(status = status.as_u16(), action = action, "SOAP response received");

    let raw_body = response
        .body_mut()
        .read_to_string()
        .context("Failed to read SOAP response body")?;

    // Parsing is non-fatal here; callers decide how much of the envelope
    // they need.
    let envelope = parse_soap_envelope(raw_body.as_bytes()).ok();

    if !status.is_success() {
        warn!(
            url = control_url,
            action = action,
            status = status.as_u16(),
            body_snippet = %response_snippet(&raw_body),
            "SOAP call returned non-success status"
        );
    }

    Ok(SoapCallResult {
        status,
        raw_body,
        envelope,
    })
}

fn response_snippet(body: &str) -> String {
    const MAX_LEN: usize = 256;
    let trimmed = body.trim();
    if trimmed.len() <= MAX_LEN {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(i, _)| *i <= MAX_LEN)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        format!("{}…", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::response_snippet;

    #[test]
    fn snippet_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let snippet = response_snippet(&body);
        assert!(snippet.len() < body.len());
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn snippet_keeps_short_bodies() {
        assert_eq!(response_snippet(" ok "), "ok");
    }
}
