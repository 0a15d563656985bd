//! Domain-driven configuration management for Tether
//!
//! Configuration is split by functional domain (transport, retry tiers,
//! circuit breakers, connectivity, offline queue, logging), each with its own
//! defaults and validation, and can be overridden through `TETHER_*`
//! environment variables.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    breaker::{BreakerConfig, BreakerSettings},
    connectivity::ConnectivityConfig,
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    queue::QueueConfig,
    retry::{RetryConfig, RetryPolicyConfig},
    TetherConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis};
