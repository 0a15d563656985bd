//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_http::HttpMethod;
use tether_resilience::PolicyTier;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print connectivity, queue and circuit breaker state as JSON
    Status {
        /// Check the health endpoint before reporting
        #[arg(long)]
        probe: bool,
    },

    /// Send one request through the resilient client
    Call {
        /// Breaker category (workflow, query, notification, system, ...)
        #[arg(long, value_name = "NAME", default_value = "system")]
        category: String,

        /// Retry tier: critical, standard, background, quick
        #[arg(long, value_name = "TIER", default_value = "standard", value_parser = parse_tier)]
        tier: PolicyTier,

        /// HTTP method
        #[arg(long, short = 'X', value_name = "METHOD", default_value = "GET")]
        method: HttpMethod,

        /// Path below the base URL, e.g. workflows/42
        #[arg(value_name = "PATH")]
        path: String,

        /// Query parameter, repeatable (example: --query status=open)
        #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// JSON request body (example: --body='{"name":"nightly"}')
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
    },

    /// Probe the health endpoint periodically and report transitions until interrupted
    Watch {
        /// Probe interval in seconds; defaults to the configured interval
        #[arg(long, value_name = "SECONDS")]
        interval: Option<u64>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Print a sample configuration with every default filled in
    Generate,
}

pub fn parse_tier(value: &str) -> Result<PolicyTier, String> {
    PolicyTier::all()
        .iter()
        .copied()
        .find(|tier| tier.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown tier '{value}' (expected critical, standard, background or quick)"))
}

pub fn parse_key_value(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{value}'"))
}
