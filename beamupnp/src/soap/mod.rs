//! SOAP support for UPnP action invocation.
//!
//! Only the control-point side is implemented: building action requests and
//! parsing response envelopes. Device-description and SOAP responses use a
//! fixed, narrow schema, so tag-scoped extraction over `xmltree` is all the
//! parsing this needs.

mod builder;
mod envelope;
mod parser;

pub use builder::build_soap_request;
pub use envelope::{SoapBody, SoapEnvelope};
pub use parser::{
    extract_child_text, find_child_with_suffix, parse_soap_envelope, SoapParseError,
};
