//! Ssrelay - Shadowsocks-style UDP relay
//!
//! This is the main entry point for the Ssrelay application.

use anyhow::Result;
use clap::Parser;
use ssrelay::config::load_config;
use ssrelay::udp::run_relays;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Ssrelay - UDP relay with encrypted local/remote tunnels
#[derive(Parser, Debug)]
#[command(name = "ssrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("{} v{}", ssrelay::NAME, ssrelay::VERSION);
    info!("Configuration loaded from: {:?}", args.config);
    if let Some(remote) = &config.remote {
        info!("Remote relay on: {}", remote.listen);
    }
    if let Some(local) = &config.local {
        info!("Relaying through server: {}", local.server);
    }

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx_clone.send(true);
    });

    run_relays(config, shutdown_rx).await
}

/// Wait for Ctrl+C, or SIGTERM on unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
                return;
            }
            Err(e) => warn!("Failed to setup SIGTERM handler: {}", e),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C, shutting down...");
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
