//! Circuit breaker pattern implementation
//!
//! ```text
//! Closed   → Open:     failure_count reaches failure_threshold
//! Open     → HalfOpen: next call after reset_timeout has elapsed
//! HalfOpen → Closed:   success_threshold consecutive successes
//! HalfOpen → Open:     any failure
//! ```
//!
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! `.await`, so every transition is atomic with respect to other callers.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tether_config::BreakerSettings;
use tokio::time::Instant;

use crate::retry::Retryable;

/// Consecutive half-open successes needed to close the circuit
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 3;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are rejected without being attempted
    Open,
    /// Circuit is half-open, calls are admitted to test recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,

    /// Number of successes in half-open state before closing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Time to wait before transitioning from open to half-open
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

fn default_success_threshold() -> u32 {
    DEFAULT_SUCCESS_THRESHOLD
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout: settings.reset_timeout,
        }
    }
}

/// Returned when a call is rejected by an open circuit.
///
/// No request was attempted, so this must never be retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Service temporarily unavailable: circuit '{category}' is open, retry in {retry_after:?}")]
pub struct CircuitOpenError {
    /// Breaker category that rejected the call
    pub category: String,
    /// Remaining cool-down before a trial call is admitted
    pub retry_after: Duration,
}

/// Point-in-time view of a breaker for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub category: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    total_requests: u64,
    total_failures: u64,
    total_rejected: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_failure_at: None,
            total_requests: 0,
            total_failures: 0,
            total_rejected: 0,
        }
    }

    fn stamp_failure(&mut self) {
        self.last_failure = Some(Instant::now());
        self.last_failure_at = Some(Utc::now());
    }
}

/// Thread-safe circuit breaker for one service category
pub struct CircuitBreaker {
    category: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("category", &self.category)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(category: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            category: category.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(category: impl Into<String>) -> Self {
        Self::new(category, CircuitBreakerConfig::default())
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run an operation through the breaker.
    ///
    /// Rejections surface as `E::from(CircuitOpenError)` without invoking the
    /// operation. Errors whose [`Retryable::trips_breaker`] is false leave the
    /// breaker unchanged.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError> + Retryable,
    {
        self.try_acquire()?;

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                if error.trips_breaker() {
                    self.record_failure();
                } else {
                    log::debug!(
                        "Circuit '{}' ignoring failure that does not indicate service trouble",
                        self.category
                    );
                }
                Err(error)
            }
        }
    }

    /// Admit or reject a call, moving Open to HalfOpen once the timeout elapsed
    pub fn try_acquire(&self) -> Result<(), CircuitOpenError> {
        let mut state = self.state.lock();
        state.total_requests += 1;

        if state.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = state
            .last_failure
            .map(|at| at.elapsed())
            .unwrap_or(self.config.reset_timeout);

        if elapsed >= self.config.reset_timeout {
            self.transition_to_half_open(&mut state);
            return Ok(());
        }

        state.total_rejected += 1;
        Err(CircuitOpenError {
            category: self.category.clone(),
            retry_after: self.config.reset_timeout - elapsed,
        })
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut state = self.state.lock();

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    self.transition_to_closed(&mut state);
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
                state.success_count = 0;
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened; the cool-down stands
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.total_failures += 1;

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.stamp_failure();
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                state.failure_count += 1;
                state.success_count = 0;
                state.stamp_failure();
                self.transition_to_open(&mut state);
            }
            CircuitState::Open => {
                // Already open, no action needed
            }
        }
    }

    /// Current state without applying the open timeout
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Immutable copy of the breaker state for diagnostics
    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        CircuitSnapshot {
            category: self.category.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_time: state.last_failure_at,
            total_requests: state.total_requests,
            total_failures: state.total_failures,
            total_rejected: state.total_rejected,
        }
    }

    /// Force the circuit closed with zeroed counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = BreakerState::new();
        log::info!("Circuit breaker '{}' reset", self.category);
    }

    // Internal methods

    fn transition_to_open(&self, state: &mut BreakerState) {
        state.state = CircuitState::Open;
        log::warn!(
            "Circuit breaker '{}' opened after {} failures",
            self.category,
            state.failure_count
        );
    }

    fn transition_to_closed(&self, state: &mut BreakerState) {
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.last_failure = None;
        log::info!("Circuit breaker '{}' closed after successful recovery", self.category);
    }

    fn transition_to_half_open(&self, state: &mut BreakerState) {
        state.state = CircuitState::HalfOpen;
        state.success_count = 0;
        log::info!("Circuit breaker '{}' transitioned to half-open state", self.category);
    }
}

/// Builder for circuit breaker configuration
pub struct CircuitBreakerBuilder {
    category: String,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    /// Create a new builder with default config
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            config: CircuitBreakerConfig::default(),
        }
    }

    /// Set failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set success threshold for recovery
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set timeout before attempting recovery
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.category, self.config)
    }
}
