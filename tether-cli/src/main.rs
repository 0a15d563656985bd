use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_client::{ApiRequest, CallOutcome, ResilientClient, StaticCredentials};
use tether_config::{ConfigLoader, LogLevel, TetherConfig};
use tether_offline::{ConnectivityEvent, ReachabilityProbe};
use tracing::{debug, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Bearer token for the API, read from the environment
const TOKEN_ENV: &str = "TETHER_TOKEN";

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<TetherConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                loader
                    .from_file(path)
                    .with_context(|| format!("Failed to load configuration from {:?}", path))
            } else {
                eprintln!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => loader
            .from_env()
            .context("Failed to load configuration from environment"),
    }
}

fn build_client(config: &TetherConfig) -> Result<ResilientClient> {
    let credentials = match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.is_empty() => StaticCredentials::new(token),
        _ => {
            debug!("{} not set, sending requests without credentials", TOKEN_ENV);
            StaticCredentials::anonymous()
        }
    };

    ResilientClient::builder(config.clone())
        .credentials(Arc::new(credentials))
        .build()
        .context("Failed to build API client")
}

async fn status_command(config: &TetherConfig, probe: bool) -> Result<()> {
    let client = build_client(config)?;

    if probe {
        let reachable = client.health_probe().probe().await;
        client
            .monitor()
            .handle_event(ConnectivityEvent::from_reachable(reachable));
    }

    let status = serde_json::to_string_pretty(&client.status())
        .context("Failed to format status as JSON")?;
    println!("{}", status);
    Ok(())
}

async fn call_command(
    config: &TetherConfig,
    request: ApiRequest,
) -> Result<()> {
    let client = build_client(config)?;
    info!(
        "Calling {} {} ({} / {})",
        request.method,
        request.display_path(),
        request.category,
        request.tier
    );

    match client.call::<JsonValue>(request).await? {
        CallOutcome::Completed(body) => {
            let formatted =
                serde_json::to_string_pretty(&body).context("Failed to format response as JSON")?;
            println!("{}", formatted);
        }
        CallOutcome::Queued(receipt) => {
            // A one-shot process exits before connectivity could return
            warn!("API unreachable; request {} was queued and will not be replayed", receipt.request_id);
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }
    Ok(())
}

async fn watch_command(config: &TetherConfig, interval: Option<u64>) -> Result<()> {
    let mut config = config.clone();
    config.connectivity.probe_enabled = true;
    if let Some(seconds) = interval {
        config.connectivity.probe_interval = Duration::from_secs(seconds.max(1));
        config.connectivity.probe_timeout = config
            .connectivity
            .probe_timeout
            .min(config.connectivity.probe_interval);
    }

    let client = build_client(&config)?;
    let _subscription = client.monitor().add_listener(|event, online| {
        println!("{} (online: {})", event, online);
    });
    let _probe = client.start_background();

    println!(
        "Watching {} every {:?}; press Ctrl-C to stop",
        client.base_url(),
        config.connectivity.probe_interval
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("{}", serde_json::to_string_pretty(&client.status())?);
    Ok(())
}

fn config_command(config_cmd: &ConfigCommands) -> Result<()> {
    match config_cmd {
        ConfigCommands::Validate { config_file } => {
            let config = ConfigLoader::new()
                .from_file(config_file)
                .with_context(|| format!("Invalid configuration in {:?}", config_file))?;
            config.validate_all()?;
            println!("Configuration {:?} is valid", config_file);
            Ok(())
        }
        ConfigCommands::Generate => {
            print!("{}", TetherConfig::generate_sample());
            Ok(())
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    tether_logging::init_logging_from_config(&config.logging)?;

    match &cli.command {
        Commands::Status { probe } => status_command(&config, *probe).await,
        Commands::Call {
            category,
            tier,
            method,
            path,
            query,
            body,
        } => {
            let mut request = ApiRequest::new(category.clone(), *tier, *method);
            for segment in split_path(path) {
                request = request.segment(segment);
            }
            for (key, value) in query {
                request = request.query(key.clone(), value.clone());
            }
            if let Some(body) = body {
                let body: JsonValue =
                    serde_json::from_str(body).context("Failed to parse --body as JSON")?;
                request = request.body(body);
            }
            call_command(&config, request).await
        }
        Commands::Watch { interval } => watch_command(&config, *interval).await,
        Commands::Config { config_cmd } => config_command(config_cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_path_ignores_empty_segments() {
        let segments: Vec<_> = split_path("/workflows//42/").collect();
        assert_eq!(segments, vec!["workflows", "42"]);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http:\n  base_url: \"https://api.example.com/v1\"").unwrap();

        temp_env::with_var_unset("TETHER_BASE_URL", || {
            let config = load_config(Some(&file.path().to_path_buf())).unwrap();
            assert_eq!(config.http.base_url, "https://api.example.com/v1");
        });
    }

    #[test]
    fn test_missing_config_file_falls_back_to_env() {
        temp_env::with_var("TETHER_BASE_URL", Some("https://env.example.com"), || {
            let config = load_config(Some(&PathBuf::from("/nonexistent/tether.yaml"))).unwrap();
            assert_eq!(config.http.base_url, "https://env.example.com");
        });
    }

    #[test]
    fn test_build_client_without_token() {
        temp_env::with_var(TOKEN_ENV, None::<&str>, || {
            let client = build_client(&TetherConfig::default()).unwrap();
            let status = client.status();
            assert!(status.is_online);
            assert_eq!(status.queue_length, 0);
            assert!(status.breaker_states.contains_key("workflow"));
        });
    }
}
