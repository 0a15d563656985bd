//! HTTP transport for Tether
//!
//! The resilient client only needs one primitive: send a request and get back
//! a status and body, or a transport error. This crate defines that
//! [`Transport`] seam, the request/response types that cross it, and a
//! `reqwest` implementation.

pub mod config;
pub mod errors;
pub mod transport;
pub mod types;

#[cfg(feature = "client")]
pub mod client;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types for convenience
pub use config::TransportConfig;
pub use errors::{HttpMethodError, TransportError};
pub use transport::Transport;
pub use types::{HttpMethod, HttpRequest, HttpResponse};

#[cfg(feature = "client")]
pub use client::ReqwestTransport;
