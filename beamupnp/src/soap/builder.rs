//! SOAP request construction.

use xmltree::{Element, EmitterConfig, XMLNode};

/// Builds a UPnP SOAP action request.
///
/// # Arguments
///
/// * `service_urn` - service URN (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - action name (ex: "SetAVTransportURI")
/// * `args` - ordered (name, value) argument pairs
///
/// Argument values are emitted as text nodes, so XML-significant characters
/// (including a DIDL-Lite document passed as metadata) are escaped by the
/// serializer.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let action_name = format!("u:{}", action);
    let mut action_elem = Element::new(&action_name);
    action_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.to_string()));
        action_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(action_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_set_av_transport_uri_request() {
        let didl = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"><item/></DIDL-Lite>"#;
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", "http://host:9876/media/movie.mp4"),
                ("CurrentURIMetaData", didl),
            ],
        )
        .unwrap();

        assert!(xml.contains("<u:SetAVTransportURI"));
        assert!(xml.contains(r#"xmlns:u="urn:schemas-upnp-org:service:AVTransport:1""#));
        assert!(xml.contains("<CurrentURI>http://host:9876/media/movie.mp4</CurrentURI>"));
        // The embedded DIDL must arrive escaped, not as nested markup.
        assert!(xml.contains("&lt;DIDL-Lite"));
        assert!(!xml.contains("<DIDL-Lite"));
        assert!(xml.contains(r#"xmlns:s="http://schemas.xmlsoap.org/soap/envelope/""#));
    }

    #[test]
    fn builds_action_without_arguments() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "GetTransportInfo",
            &[("InstanceID", "0")],
        )
        .unwrap();
        assert!(xml.contains("<u:GetTransportInfo"));
        assert!(xml.contains("<InstanceID>0</InstanceID>"));
    }
}
