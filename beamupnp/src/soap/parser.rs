//! SOAP response parsing.

use super::{SoapBody, SoapEnvelope};
use std::io::BufReader;
use xmltree::{Element, XMLNode};

#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,
}

/// Parses a complete SOAP envelope from raw XML bytes.
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let body_elem = root
        .get_child("Body")
        .or_else(|| {
            root.children
                .iter()
                .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Body")))
        })
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        body: SoapBody {
            content: body_elem.clone(),
        },
    })
}

/// Finds the first direct child whose local name ends with `suffix`.
///
/// Renderers are sloppy about namespace prefixes, so matching on the name
/// suffix is the robust way to locate response elements.
pub fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}

/// Trimmed text content of the first child whose name ends with `suffix`.
pub fn extract_child_text(parent: &Element, suffix: &str) -> Option<String> {
    let child = find_child_with_suffix(parent, suffix)?;
    child
        .get_text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITION_INFO: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetPositionInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <Track>1</Track>
      <TrackDuration>01:52:30</TrackDuration>
      <RelTime>00:04:07</RelTime>
    </u:GetPositionInfoResponse>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn parses_envelope_and_extracts_fields() {
        let envelope = parse_soap_envelope(POSITION_INFO.as_bytes()).unwrap();
        let response =
            find_child_with_suffix(&envelope.body.content, "GetPositionInfoResponse").unwrap();
        assert_eq!(
            extract_child_text(response, "RelTime").as_deref(),
            Some("00:04:07")
        );
        assert_eq!(
            extract_child_text(response, "TrackDuration").as_deref(),
            Some("01:52:30")
        );
    }

    #[test]
    fn rejects_non_envelope_root() {
        let err = parse_soap_envelope(b"<root/>").unwrap_err();
        assert!(matches!(err, SoapParseError::MissingEnvelope));
    }

    #[test]
    fn rejects_envelope_without_body() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        let err = parse_soap_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapParseError::MissingBody));
    }
}
