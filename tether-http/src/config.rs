//! Transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_config::HttpConfig;

/// Settings for the reqwest transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Maximum number of redirects to follow
    pub max_redirects: u32,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for TransportConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_redirects: config.max_redirects,
            user_agent: config.user_agent.clone(),
            verify_ssl: config.verify_ssl,
        }
    }
}
