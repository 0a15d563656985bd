//! Circuit breaker wrapped around the retry executor
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tether_resilience::{
    CircuitBreakerBuilder, CircuitOpenError, CircuitState, RetryExecutor, RetryPolicy, Retryable,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
enum TestError {
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Permanent error: {0}")]
    Permanent(String),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Retryable for TestError {
    fn is_retryable(&self) -> bool {
        matches!(self, TestError::Transient(_))
    }

    fn trips_breaker(&self) -> bool {
        !matches!(self, TestError::Permanent(_))
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(100), 2.0)
}

#[tokio::test(start_paused = true)]
async fn test_retry_sequence_counts_as_one_breaker_outcome() {
    let executor = RetryExecutor::new(policy());
    let breaker = CircuitBreakerBuilder::new("query")
        .failure_threshold(2)
        .reset_timeout(Duration::from_secs(1))
        .build();
    let attempts = AtomicU32::new(0);

    let result: Result<(), TestError> = breaker
        .execute(|| {
            executor.execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient("connection reset".to_string())) }
            })
        })
        .await;

    assert!(matches!(result, Err(TestError::Transient(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_is_not_retried() {
    let executor = RetryExecutor::new(policy());
    let breaker = CircuitBreakerBuilder::new("workflow")
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(10))
        .build();
    breaker.record_failure();

    let attempts = AtomicU32::new(0);
    let result: Result<(), TestError> = executor
        .execute(|| {
            breaker.execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
        })
        .await;

    assert!(matches!(result, Err(TestError::CircuitOpen(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert_eq!(breaker.snapshot().total_rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_errors_pass_through_untouched() {
    let executor = RetryExecutor::new(policy());
    let breaker = CircuitBreakerBuilder::new("workflow").failure_threshold(1).build();

    let result: Result<(), TestError> = breaker
        .execute(|| executor.execute(|| async { Err(TestError::Permanent("404".to_string())) }))
        .await;

    assert_eq!(result, Err(TestError::Permanent("404".to_string())));
    assert_eq!(breaker.state(), CircuitState::Closed);
}
