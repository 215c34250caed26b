//! triplog - vehicle bus trip logger
//!
//! Decodes BSI telemetry frames from the vehicle's comfort bus, aggregates
//! them into per-interval records and multi-record trips, and persists both
//! to SQLite with crash-safe reconciliation.
//!
//! Module structure:
//! - `domain/` - Core data types (Frame, Measurement, Record, Trip)
//! - `io/` - External interfaces (SLCAN serial source, SQLite store)
//! - `services/` - Business logic (Recorder, persistence worker)
//! - `infra/` - Infrastructure (Config)

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use triplog::infra::Config;
use triplog::io::{SlcanMonitor, Store};
use triplog::services::{persistence, Recorder};

/// triplog - vehicle bus trip logger
#[derive(Parser, Debug)]
#[command(name = "triplog", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("triplog starting");

    let args = Args::parse();
    let config = Config::load(&args.config);

    info!(
        config_file = %config.config_file(),
        can_device = %config.can_device(),
        can_baud = %config.can_baud(),
        can_bitrate = %config.can_bitrate(),
        database = %config.database_path(),
        summary_every = %config.summary_every(),
        "config_loaded"
    );

    let store = Store::open(config.database_path())?;
    info!(path = %config.database_path(), "database_opened");

    let (persist, worker) = persistence::spawn(store)?;

    // pick up any records a previous run left un-grouped
    persist.reconcile();

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Frame channel (bounded for backpressure)
    let (frame_tx, frame_rx) = mpsc::channel(1000);

    // Start the SLCAN monitor
    let monitor =
        SlcanMonitor::new(config.can_device(), config.can_baud(), config.can_bitrate(), frame_tx);
    let monitor_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the recorder - consumes frames until the channel closes
    let recorder = Recorder::new(persist, config.summary_every());
    recorder.run(frame_rx).await;

    // the recorder dropped its persistence handle; wait for the worker
    // to drain whatever is still queued
    if worker.join().is_err() {
        error!("persist_worker_panicked");
    }

    info!("triplog shutdown complete");
    Ok(())
}
