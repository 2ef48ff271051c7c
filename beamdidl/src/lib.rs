//! # beamdidl - DIDL-Lite documents for cast metadata
//!
//! DLNA renderers expect the `CurrentURIMetaData` argument of
//! `SetAVTransportURI` to carry a DIDL-Lite description of the item being
//! loaded. This crate models the narrow subset Beamer needs (a single video
//! item with one resource) and the XML escaping rules for embedding the
//! document inside a SOAP argument.

use serde::{Deserialize, Serialize};

/// DLNA.ORG_FLAGS value advertising a streamable, range-capable resource.
pub const DLNA_ORG_FLAGS: &str = "DLNA.ORG_FLAGS=01700000000000000000000000000000";

/// Root of a DIDL-Lite document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "DIDL-Lite")]
pub struct DIDLLite {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,

    #[serde(rename = "@xmlns:upnp", skip_serializing_if = "Option::is_none")]
    pub xmlns_upnp: Option<String>,

    #[serde(rename = "@xmlns:dc", skip_serializing_if = "Option::is_none")]
    pub xmlns_dc: Option<String>,

    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

/// A single playable object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@parentID")]
    pub parent_id: String,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(rename = "dc:title", alias = "title")]
    pub title: String,

    #[serde(rename = "upnp:class", alias = "class")]
    pub class: String,

    #[serde(rename = "res", default)]
    pub resources: Vec<Resource>,
}

/// A media resource: the URL the renderer will pull, plus its protocolInfo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "@protocolInfo")]
    pub protocol_info: String,

    #[serde(rename = "$text")]
    pub url: String,
}

impl DIDLLite {
    /// Builds the one-item document describing a video at `url`.
    pub fn video_item(title: &str, url: &str, mime: &str) -> Self {
        DIDLLite {
            xmlns: "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/".to_string(),
            xmlns_upnp: Some("urn:schemas-upnp-org:metadata-1-0/upnp/".to_string()),
            xmlns_dc: Some("http://purl.org/dc/elements/1.1/".to_string()),
            items: vec![Item {
                id: "0".to_string(),
                parent_id: "-1".to_string(),
                restricted: Some("1".to_string()),
                title: title.to_string(),
                class: "object.item.videoItem".to_string(),
                resources: vec![Resource {
                    protocol_info: format!("http-get:*:{}:{}", mime, DLNA_ORG_FLAGS),
                    url: url.to_string(),
                }],
            }],
        }
    }

    /// Serializes the document to XML.
    pub fn to_xml(&self) -> Result<String, quick_xml::se::SeError> {
        quick_xml::se::to_string(self)
    }

    /// Parses a DIDL-Lite document.
    pub fn parse(input: &str) -> Result<Self, quick_xml::de::DeError> {
        quick_xml::de::from_str(input)
    }
}

/// Escapes a document for embedding as SOAP argument text.
///
/// Order matters: `&` first, or the other replacements get double-escaped.
pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Inverse of [`escape_xml`].
pub fn unescape_xml(input: &str) -> String {
    input
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_item_serializes_expected_shape() {
        let didl = DIDLLite::video_item(
            "movie.mp4",
            "http://10.0.0.2:9876/media/movie.mp4",
            "video/mp4",
        );
        let xml = didl.to_xml().unwrap();

        assert!(xml.starts_with("<DIDL-Lite"));
        assert!(xml.contains(r#"xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/""#));
        assert!(xml.contains("<dc:title>movie.mp4</dc:title>"));
        assert!(xml.contains("<upnp:class>object.item.videoItem</upnp:class>"));
        assert!(xml.contains(&format!(
            r#"protocolInfo="http-get:*:video/mp4:{}""#,
            DLNA_ORG_FLAGS
        )));
        assert!(xml.contains(">http://10.0.0.2:9876/media/movie.mp4</res>"));
    }

    #[test]
    fn escape_then_unescape_is_identity() {
        let didl = DIDLLite::video_item("A & B <cut>", "http://h/media/a%20b.mp4", "video/mp4")
            .to_xml()
            .unwrap();
        let escaped = escape_xml(&didl);
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('"'));
        assert_eq!(unescape_xml(&escaped), didl);
    }

    #[test]
    fn escape_handles_preexisting_entities() {
        // A title serialized by quick-xml already carries &amp;; escaping for
        // SOAP must not corrupt it on the way back.
        let raw = "<dc:title>A &amp; B</dc:title>";
        assert_eq!(unescape_xml(&escape_xml(raw)), raw);
    }

    #[test]
    fn parse_roundtrip() {
        let didl = DIDLLite::video_item("t", "http://h/m.mkv", "video/x-matroska");
        let xml = didl.to_xml().unwrap();
        let parsed = DIDLLite::parse(&xml).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "t");
        assert_eq!(parsed.items[0].resources[0].url, "http://h/m.mkv");
    }
}
