//! SOAP envelope structures.

use xmltree::Element;

/// A parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// The Body element, holding the action response (or a Fault).
    pub body: SoapBody,
}

/// SOAP body.
#[derive(Debug, Clone)]
pub struct SoapBody {
    /// Raw XML content of the body.
    pub content: Element,
}
