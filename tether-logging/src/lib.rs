//! Logging initialisation for Tether
//!
//! All Tether crates emit `tracing` events (or `log` records, which the
//! subscriber bridges). This crate installs the process-wide subscriber from
//! a [`LoggingConfig`].

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
pub use tether_config::{LogFormat, LogLevel, LoggingConfig};
