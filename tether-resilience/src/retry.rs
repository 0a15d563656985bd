//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tether_config::{RetryConfig, RetryPolicyConfig};
use tokio::time::sleep;

use crate::backoff::ExponentialBackoff;

/// Named retry tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTier {
    /// User-facing writes that must not be lost
    Critical,
    /// Ordinary reads and writes
    Standard,
    /// Fire-and-forget traffic
    Background,
    /// Latency sensitive checks
    Quick,
}

impl PolicyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyTier::Critical => "critical",
            PolicyTier::Standard => "standard",
            PolicyTier::Background => "background",
            PolicyTier::Quick => "quick",
        }
    }

    pub fn all() -> &'static [PolicyTier] {
        &[
            PolicyTier::Critical,
            PolicyTier::Standard,
            PolicyTier::Background,
            PolicyTier::Quick,
        ]
    }
}

impl fmt::Display for PolicyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after every attempt
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_factor,
        }
    }

    /// Policy for user-facing writes
    pub fn critical() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(10), 2.0)
    }

    /// Policy for ordinary traffic
    pub fn standard() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(5), 2.0)
    }

    /// Policy for background traffic, slower to give up and slower to retry
    pub fn background() -> Self {
        Self::new(2, Duration::from_secs(2), Duration::from_secs(30), 3.0)
    }

    /// Policy for latency sensitive calls
    pub fn quick() -> Self {
        Self::new(1, Duration::from_millis(500), Duration::from_secs(1), 2.0)
    }

    /// Built-in policy for a tier
    pub fn for_tier(tier: PolicyTier) -> Self {
        match tier {
            PolicyTier::Critical => Self::critical(),
            PolicyTier::Standard => Self::standard(),
            PolicyTier::Background => Self::background(),
            PolicyTier::Quick => Self::quick(),
        }
    }

    /// Configured policy for a tier
    pub fn from_config(config: &RetryConfig, tier: PolicyTier) -> Self {
        let tier_config = match tier {
            PolicyTier::Critical => &config.critical,
            PolicyTier::Standard => &config.standard,
            PolicyTier::Background => &config.background,
            PolicyTier::Quick => &config.quick,
        };
        Self::from(tier_config)
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate delay before retrying after the given failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        ExponentialBackoff::new(self.base_delay, self.max_delay, self.backoff_factor)
            .delay(attempt)
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
        }
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Whether this error counts as a failure of the remote service.
    ///
    /// Errors that prove the service answered (client errors) should return
    /// `false` so they leave circuit breaker state untouched.
    fn trips_breaker(&self) -> bool {
        true
    }
}

/// Telemetry hooks for retry loops
pub trait RetryObserver: Send + Sync {
    /// Called before sleeping ahead of another attempt
    fn on_retry(&self, error: &dyn fmt::Display, attempt: u32, delay: Duration);

    /// Called when an operation eventually succeeds
    fn on_success(&self, _attempts: u32) {}

    /// Called when the last permitted attempt failed
    fn on_exhausted(&self, _error: &dyn fmt::Display, _attempts: u32) {}
}

/// Retry executor
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: None,
        }
    }

    /// Create with default policy
    pub fn with_default_policy() -> Self {
        Self::new(RetryPolicy::default())
    }

    /// Attach a telemetry observer
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function, retrying errors whose [`Retryable::is_retryable`] holds
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        self.execute_with_context(|_attempt| f(), |error: &E| error.is_retryable())
            .await
    }

    /// Execute a function with a custom retry condition
    pub async fn execute_if<F, Fut, T, E, C>(&self, mut f: F, condition: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        C: Fn(&E) -> bool,
    {
        self.execute_with_context(|_attempt| f(), condition).await
    }

    /// Execute a function with retry logic and attempt context.
    ///
    /// The last error is returned unchanged once the condition rejects it or
    /// the attempts are used up.
    pub async fn execute_with_context<F, Fut, T, E, C>(&self, mut f: F, condition: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            debug!("Executing attempt {} of {}", attempt, max_attempts);

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    if let Some(observer) = &self.observer {
                        observer.on_success(attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !condition(&error) {
                        debug!("Operation failed with non-retryable error: {}", error);
                        return Err(error);
                    }

                    if attempt >= max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        if let Some(observer) = &self.observer {
                            observer.on_exhausted(&error, attempt);
                        }
                        return Err(error);
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_retry(&error, attempt, delay);
                    }

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError {
        retryable: bool,
        message: String,
    }

    impl TestError {
        fn transient(message: impl Into<String>) -> Self {
            Self {
                retryable: true,
                message: message.into(),
            }
        }

        fn permanent(message: impl Into<String>) -> Self {
            Self {
                retryable: false,
                message: message.into(),
            }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        retries: Mutex<Vec<(u32, Duration)>>,
        successes: Mutex<Vec<u32>>,
        exhausted: Mutex<Vec<u32>>,
    }

    impl RetryObserver for RecordingObserver {
        fn on_retry(&self, _error: &dyn fmt::Display, attempt: u32, delay: Duration) {
            self.retries.lock().push((attempt, delay));
        }

        fn on_success(&self, attempts: u32) {
            self.successes.lock().push(attempts);
        }

        fn on_exhausted(&self, _error: &dyn fmt::Display, attempts: u32) {
            self.exhausted.lock().push(attempts);
        }
    }

    fn scenario_policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(100), Duration::from_millis(1000), 2.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let counter = AtomicU32::new(0);
        let observer = Arc::new(RecordingObserver::default());
        let executor = RetryExecutor::new(scenario_policy()).with_observer(observer.clone());

        let started = Instant::now();
        let result = executor
            .execute(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(TestError::transient("Temporary failure"))
                    } else {
                        Ok("Success".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(
            *observer.retries.lock(),
            vec![(1, Duration::from_millis(100)), (2, Duration::from_millis(200))]
        );
        assert_eq!(*observer.successes.lock(), vec![3]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(310), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error_unchanged() {
        let counter = AtomicU32::new(0);
        let observer = Arc::new(RecordingObserver::default());
        let executor = RetryExecutor::new(scenario_policy()).with_observer(observer.clone());

        let result: Result<(), TestError> = executor
            .execute(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(TestError::transient(format!("failure {}", count))) }
            })
            .await;

        assert_eq!(result.unwrap_err(), TestError::transient("failure 3"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*observer.exhausted.lock(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_makes_one_attempt() {
        let counter = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::critical());

        let started = Instant::now();
        let result: Result<(), TestError> = executor
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::permanent("bad request")) }
            })
            .await;

        assert_eq!(result.unwrap_err().message, "bad request");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_condition_overrides_error_classification() {
        let counter = AtomicU32::new(0);
        let executor = RetryExecutor::new(scenario_policy());

        let result: Result<(), TestError> = executor
            .execute_if(
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::permanent("retry me anyway")) }
                },
                |_error| true,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_context() {
        let executor = RetryExecutor::new(RetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
            2.0,
        ));

        let result = executor
            .execute_with_context(
                |attempt| async move {
                    if attempt < 3 {
                        Err(TestError::transient(format!("Attempt {}", attempt)))
                    } else {
                        Ok(attempt)
                    }
                },
                |error: &TestError| error.is_retryable(),
            )
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), Duration::from_millis(10), 2.0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_tier_policies_match_configuration_defaults() {
        let config = RetryConfig::default();
        for tier in PolicyTier::all() {
            assert_eq!(
                RetryPolicy::from_config(&config, *tier),
                RetryPolicy::for_tier(*tier),
                "tier {}",
                tier
            );
        }
    }

    #[test]
    fn test_policy_serde_uses_humantime() {
        let json = serde_json::to_value(RetryPolicy::quick()).unwrap();
        assert_eq!(json["base_delay"], "500ms");
        assert_eq!(json["max_delay"], "1s");
    }
}
