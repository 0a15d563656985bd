//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Malformed `TETHER_*` override
    #[error("Environment variable error: {0}")]
    EnvError(String),

    /// A domain failed validation
    #[error("Domain configuration error in {domain}: {message}")]
    DomainError { domain: String, message: String },
}

impl ConfigError {
    /// Domain that rejected the configuration, if any
    pub fn domain(&self) -> Option<&str> {
        match self {
            ConfigError::DomainError { domain, .. } => Some(domain),
            _ => None,
        }
    }
}
