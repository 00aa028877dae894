use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use sovereignty::{Config, Engine, MemoryVault, NullMarkers, SystemClock, spawn_sweeps};

const DEFAULT_CONFIG: &str = "sovereignty.ron";

#[derive(Debug, Parser)]
#[command(name = "sovereignty")]
#[command(about = "Run the nations engine and its background sweeps")]
struct Cli {
    /// RON config file (default: ./sovereignty.ron when present)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::start(
        config,
        Arc::new(MemoryVault::default()),
        Arc::new(NullMarkers),
        Arc::new(SystemClock),
    )
    .await
    {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let (stop, stopped) = watch::channel(false);
    let sweeps = spawn_sweeps(&engine, stopped);
    info!(sweeps = sweeps.len(), "sovereignty engine ready");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for shutdown signal");
    }
    info!("shutting down");
    let _ = stop.send(true);
    for sweep in sweeps {
        if let Err(err) = sweep.await {
            warn!(error = %err, "sweep task ended abnormally");
        }
    }
    match engine.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "final flush failed");
            ExitCode::FAILURE
        }
    }
}

/// The given path, else `sovereignty.ron` if present, else defaults.
fn load_config(path: Option<PathBuf>) -> Result<Config, sovereignty::config::ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None if PathBuf::from(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG),
        None => {
            info!("no config file given, using defaults");
            Ok(Config::default())
        }
    }
}
