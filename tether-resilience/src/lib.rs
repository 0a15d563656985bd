//! Resilience patterns for Tether
//!
//! This crate provides exponential backoff, named retry policies with a
//! retry executor, and per-category circuit breakers.

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod retry;

// Re-export commonly used types
pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig, CircuitOpenError,
    CircuitSnapshot, CircuitState,
};
pub use registry::CircuitBreakerRegistry;
pub use retry::{PolicyTier, RetryExecutor, RetryObserver, RetryPolicy, Retryable};
