//! Retry tier configuration
//!
//! Four named tiers are configured independently. Delays are expressed in
//! milliseconds so sub-second backoff can be tuned.

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Parameters of a single retry tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Upper bound for any single delay
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt, must be greater than 1
    pub backoff_factor: f64,
}

impl RetryPolicyConfig {
    pub const fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_factor,
        }
    }

    fn check(&self, tier: &str, domain: &str) -> ConfigResult<()> {
        let fail = |message: String| crate::error::ConfigError::DomainError {
            domain: format!("{}.{}", domain, tier),
            message,
        };

        if self.base_delay_ms == 0 {
            return Err(fail("base_delay_ms must be greater than 0".to_string()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(fail(format!(
                "max_delay_ms ({}) must be at least base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err(fail(format!(
                "backoff_factor must be a finite number greater than 1, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

/// Retry configuration for every tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// User-facing writes that must not be lost
    pub critical: RetryPolicyConfig,

    /// Ordinary reads and writes
    pub standard: RetryPolicyConfig,

    /// Fire-and-forget traffic such as notifications
    pub background: RetryPolicyConfig,

    /// Latency sensitive checks
    pub quick: RetryPolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            critical: RetryPolicyConfig::new(5, 1_000, 10_000, 2.0),
            standard: RetryPolicyConfig::new(3, 1_000, 5_000, 2.0),
            background: RetryPolicyConfig::new(2, 2_000, 30_000, 3.0),
            quick: RetryPolicyConfig::new(1, 500, 1_000, 2.0),
        }
    }
}

impl Validatable for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.critical.check("critical", self.domain_name())?;
        self.standard.check("standard", self.domain_name())?;
        self.background.check("background", self.domain_name())?;
        self.quick.check("quick", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "retry"
    }
}
