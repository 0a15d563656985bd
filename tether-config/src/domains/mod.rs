//! Domain-specific configuration modules

pub mod breaker;
pub mod connectivity;
pub mod http;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Tether configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TetherConfig {
    /// HTTP transport configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Retry tiers
    #[serde(default)]
    pub retry: retry::RetryConfig,

    /// Circuit breakers per service category
    #[serde(default)]
    pub breakers: breaker::BreakerConfig,

    /// Connectivity monitoring
    #[serde(default)]
    pub connectivity: connectivity::ConnectivityConfig,

    /// Offline request queue
    #[serde(default)]
    pub queue: queue::QueueConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl TetherConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.http.validate()?;
        self.retry.validate()?;
        self.breakers.validate()?;
        self.connectivity.validate()?;
        self.queue.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TetherConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
