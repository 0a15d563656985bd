//! Connectivity monitoring configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connectivity monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Whether the periodic reachability probe runs
    #[serde(default = "crate::domains::utils::default_true")]
    pub probe_enabled: bool,

    /// Interval between probes
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_probe_interval"
    )]
    pub probe_interval: Duration,

    /// Timeout for a single probe
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_probe_timeout"
    )]
    pub probe_timeout: Duration,

    /// Path of the health endpoint, relative to the base URL
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Initial reachability when the environment gives no signal
    #[serde(default = "crate::domains::utils::default_true")]
    pub assume_online: bool,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_enabled: true,
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
            health_path: default_health_path(),
            assume_online: true,
        }
    }
}

impl Validatable for ConnectivityConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.probe_interval.as_millis(), "probe_interval", self.domain_name())?;
        validate_positive(self.probe_timeout.as_millis(), "probe_timeout", self.domain_name())?;
        validate_required_string(&self.health_path, "health_path", self.domain_name())?;

        if self.probe_timeout > self.probe_interval {
            return Err(self.validation_error(format!(
                "probe_timeout ({:?}) cannot exceed probe_interval ({:?})",
                self.probe_timeout, self.probe_interval
            )));
        }
        if !self.health_path.starts_with('/') {
            return Err(self.validation_error("health_path must start with '/'"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "connectivity"
    }
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_health_path() -> String {
    "/health".to_string()
}
