//! geotrackd - background geolocation engine service runner.
//!
//! Boots the engine with a config file (or defaults), wires structured
//! logging, and drives the async timer loop until Ctrl+C.

use std::path::PathBuf;

use clap::Parser;
use geotrack::app::Engine;
use geotrack::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "geotrackd", version, about = "Background geolocation tracking daemon")]
struct Cli {
    /// Path to an INI config file. Falls back to built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for rolling log files. Logs go to stderr only when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Override the configured log level (e.g. "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Config {
    match &cli.config {
        Some(path) => match Config::from_ini_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config from {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = load_config(&cli);
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    let log_dir = cli.log_dir.clone().or_else(|| Some(geotrack::app::default_log_dir()));
    let _guard = geotrack::telemetry::init_logging(&config.log_level, log_dir.as_deref());

    let engine = match Engine::start(config).await {
        Ok(engine) => engine,
        Err(err) => {
            error!(%err, "failed to bootstrap engine");
            std::process::exit(1);
        }
    };

    let shutdown = engine.shutdown_handle();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("shutdown signal received");
        ctrlc_shutdown.cancel();
    }) {
        error!(%err, "failed to install Ctrl+C handler");
    }

    info!("geotrackd starting");
    engine.run().await;
    info!("geotrackd stopped");
}

/// Gives tests a deterministic shutdown token without going through signals.
#[cfg(test)]
fn test_shutdown_token() -> CancellationToken {
    CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_when_no_path_given() {
        let cli = Cli {
            config: None,
            log_dir: None,
            log_level: None,
        };
        let config = load_config(&cli);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn shutdown_token_starts_uncancelled() {
        assert!(!test_shutdown_token().is_cancelled());
    }
}
