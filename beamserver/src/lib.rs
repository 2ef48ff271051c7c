//! HTTP server layer of the Beamer cast helper.
//!
//! [`Server`] wraps axum router composition and graceful shutdown; the
//! [`media`] module contributes the range-capable media and subtitle routes
//! that cast endpoints pull from.

pub mod media;
mod server;

pub use media::MediaServeExt;
pub use server::{preflight, Server, ServerInfo};
