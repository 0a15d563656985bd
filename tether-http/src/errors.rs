//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Failure to obtain any HTTP response.
///
/// A response with a non-2xx status is not a transport error; it is returned
/// as an [`HttpResponse`](crate::HttpResponse) for the caller to classify.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset, or any other lack of response
    #[error("Network error: {0}")]
    Network(String),

    /// No response within the deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether the failure means the server could not be reached
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout(_))
    }
}

/// Errors that can occur when parsing HTTP methods
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpMethodError {
    #[error("Invalid HTTP method: '{0}'. Supported methods are: GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS")]
    InvalidMethod(String),
}
