//! Client error type

use serde_json::Value as JsonValue;
use std::time::Duration;
use tether_config::ConfigError;
use tether_http::TransportError;
use tether_resilience::{CircuitOpenError, Retryable};
use thiserror::Error;

use crate::credential::CredentialError;

/// Terminal outcome of a failed API call
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was received
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: JsonValue },

    /// The category's breaker rejected the call without sending it
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client was built from a configuration that fails validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Whether the failure means the API could not be reached
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout(_))
    }

    /// Response status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    fn is_server_side(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout(_) => true,
            ClientError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        self.is_server_side()
    }

    fn trips_breaker(&self) -> bool {
        self.is_server_side()
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => ClientError::Network(message),
            TransportError::Timeout(after) => ClientError::Timeout(after),
            TransportError::InvalidRequest(message) => ClientError::InvalidRequest(message),
        }
    }
}

impl From<CredentialError> for ClientError {
    fn from(err: CredentialError) -> Self {
        ClientError::Auth(err.to_string())
    }
}
