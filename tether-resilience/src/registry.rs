//! Per-category circuit breaker registry

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tether_config::BreakerConfig;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot};

/// Owns one breaker per service category for the lifetime of the registry.
///
/// Configured categories are created up front so diagnostics list them before
/// any traffic; other categories are created on first use with the default
/// settings.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        let breakers = config
            .categories
            .iter()
            .map(|(category, settings)| {
                let breaker = CircuitBreaker::new(category.clone(), CircuitBreakerConfig::from(settings));
                (category.clone(), Arc::new(breaker))
            })
            .collect();

        Self {
            config,
            breakers: RwLock::new(breakers),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::default())
    }

    /// Breaker for a category, created on first use
    pub fn get(&self, category: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(category) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(category.to_string())
            .or_insert_with(|| {
                log::debug!("Creating circuit breaker for category '{}'", category);
                let settings = self.config.settings_for(category);
                Arc::new(CircuitBreaker::new(category, CircuitBreakerConfig::from(settings)))
            })
            .clone()
    }

    pub fn categories(&self) -> Vec<String> {
        self.breakers.read().keys().cloned().collect()
    }

    /// Snapshots of every known breaker, keyed by category
    pub fn snapshots(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.breakers
            .read()
            .iter()
            .map(|(category, breaker)| (category.clone(), breaker.snapshot()))
            .collect()
    }

    /// Force every breaker closed
    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use std::time::Duration;

    #[test]
    fn test_configured_categories_exist_up_front() {
        let registry = CircuitBreakerRegistry::with_defaults();
        let categories = registry.categories();
        assert!(categories.contains(&"workflow".to_string()));
        assert!(categories.contains(&"query".to_string()));
        assert!(categories.contains(&"notification".to_string()));
        assert_eq!(registry.get("query").config().failure_threshold, 3);
    }

    #[test]
    fn test_same_breaker_returned_for_category() {
        let registry = CircuitBreakerRegistry::with_defaults();
        let first = registry.get("reports");
        let second = registry.get("reports");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.config().reset_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_categories_are_independent_and_reset_together() {
        let registry = CircuitBreakerRegistry::with_defaults();
        let query = registry.get("query");
        for _ in 0..3 {
            query.record_failure();
        }

        let snapshots = registry.snapshots();
        assert_eq!(snapshots["query"].state, CircuitState::Open);
        assert_eq!(snapshots["workflow"].state, CircuitState::Closed);

        registry.reset_all();
        assert_eq!(registry.get("query").state(), CircuitState::Closed);
    }
}
