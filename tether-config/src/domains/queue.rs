//! Offline request queue configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Offline request queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum buffered requests; the oldest entry is dropped beyond this
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Replay attempts before a queued request is discarded
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between consecutive replays during a drain
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_replay_delay"
    )]
    pub replay_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_retries: default_max_retries(),
            replay_delay: default_replay_delay(),
        }
    }
}

impl Validatable for QueueConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_queue_size, "max_queue_size", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "queue"
    }
}

fn default_max_queue_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_replay_delay() -> Duration {
    Duration::from_millis(100)
}
