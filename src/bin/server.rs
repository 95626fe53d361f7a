//! Rustrade Server - headless trading system entrypoint.
//!
//! Loads the two-layer configuration (YAML topology + environment
//! credentials), bootstraps every component (Market Engine workers, Risk
//! Gate, Event Fan-out, admin HTTP surface) under one `Supervisor`, and
//! runs until SIGINT/SIGTERM triggers a bounded graceful drain.

use anyhow::Result;
use clap::Parser;
use rustrade::application::bootstrap;
use rustrade::config::{Config, Mode};
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "rustrade-server", version, about = "Headless automated trading engine")]
struct Cli {
    /// Root YAML configuration file.
    #[arg(long, default_value = "config/rustrade.yaml")]
    config: std::path::PathBuf,

    /// Name of the exchange whose balances seed the market's initial state.
    #[arg(long, default_value = "binance")]
    primary_exchange: String,

    /// `simulate` (paper trading, no live orders) or `live`.
    #[arg(long, default_value = "simulate")]
    mode: String,

    /// `pretty` (human-readable) or `json` (structured, for log aggregators).
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(cli: &Cli) {
    let level: Level = cli.log_level.parse().unwrap_or(Level::INFO);
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_target(false))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false).pretty())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("rustrade server {} starting", env!("CARGO_PKG_VERSION"));

    let mode: Mode = cli.mode.parse()?;
    let config = Config::load(&cli.config, &cli.primary_exchange, mode)?;
    info!(mode = ?config.mode, primary_exchange = %config.primary_exchange, "configuration loaded");

    let system = bootstrap::bootstrap(config).await?;
    system.supervisor.mark_running();

    let listener = tokio::net::TcpListener::bind((system.http_bind_address.as_str(), system.http_port)).await?;
    info!(address = %listener.local_addr()?, "admin HTTP surface listening");
    let http_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, system.http_router).await {
            tracing::error!(error = %err, "admin HTTP surface exited");
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining market workers");

    system.supervisor.shutdown().await;
    http_server.abort();

    info!("rustrade server stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
