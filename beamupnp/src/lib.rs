//! UPnP control-point plumbing for the Beamer cast helper.
//!
//! This crate owns the three wire-level concerns of talking to DLNA
//! renderers: SSDP discovery (M-SEARCH over UDP multicast), SOAP request
//! construction and response parsing, and device-description retrieval.

pub mod description;
pub mod soap;
pub mod ssdp;
