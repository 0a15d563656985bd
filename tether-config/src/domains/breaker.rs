//! Circuit breaker configuration per service category

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Thresholds for one breaker category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time the circuit stays open before admitting a trial call
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub reset_timeout: Duration,
}

impl BreakerSettings {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
        }
    }
}

/// Breaker configuration keyed by category name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Settings used for categories without an explicit entry
    pub default: BreakerSettings,

    /// Per-category overrides
    pub categories: BTreeMap<String, BreakerSettings>,
}

impl BreakerConfig {
    /// Settings for a category, falling back to the default entry
    pub fn settings_for(&self, category: &str) -> &BreakerSettings {
        self.categories.get(category).unwrap_or(&self.default)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        let categories = [
            ("workflow", BreakerSettings::new(5, Duration::from_secs(30))),
            ("query", BreakerSettings::new(3, Duration::from_secs(20))),
            ("notification", BreakerSettings::new(10, Duration::from_secs(60))),
            ("system", BreakerSettings::new(3, Duration::from_secs(30))),
        ]
        .into_iter()
        .map(|(name, settings)| (name.to_string(), settings))
        .collect();

        Self {
            default: BreakerSettings::new(5, Duration::from_secs(30)),
            categories,
        }
    }
}

impl Validatable for BreakerConfig {
    fn validate(&self) -> ConfigResult<()> {
        let entries = std::iter::once(("default", &self.default))
            .chain(self.categories.iter().map(|(k, v)| (k.as_str(), v)));

        for (name, settings) in entries {
            let domain = format!("{}.{}", self.domain_name(), name);
            validate_positive(settings.failure_threshold, "failure_threshold", &domain)?;
            validate_positive(settings.reset_timeout.as_secs(), "reset_timeout", &domain)?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "breakers"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_categories() {
        let config = BreakerConfig::default();
        assert_eq!(config.settings_for("query").failure_threshold, 3);
        assert_eq!(
            config.settings_for("notification").reset_timeout,
            Duration::from_secs(60)
        );
        assert_eq!(config.settings_for("reports"), &config.default);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = BreakerConfig::default();
        config
            .categories
            .insert("reports".to_string(), BreakerSettings::new(0, Duration::from_secs(5)));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("breakers.reports"));
    }
}
