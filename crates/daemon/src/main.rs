//! mergewatch daemon entry point.
//!
//! Loads configuration, builds the conflict detector, starts the poll
//! scheduler and event logger, and handles graceful shutdown. SIGHUP
//! reloads the configuration file in place.

mod scheduler;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mergewatch_core::config::WatchConfig;
use mergewatch_core::models::DetectionStatus;
use mergewatch_core::{ConflictDetector, DetectorEvent, ProcessRunner};

use scheduler::{Scheduler, SchedulerCommand};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// mergewatch conflict-detection daemon.
#[derive(Parser, Debug)]
#[command(
    name = "mergewatch-daemon",
    version,
    about = "Continuously detects whether merging with a remote branch would conflict"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Run a single detection cycle, print the snapshot as JSON, and exit.
    /// Exit code 0 means clean, 1 conflicts, 2 detection error.
    #[arg(long)]
    once: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load and validate configuration
    let config =
        WatchConfig::load_from_file(&args.config).context("failed to load configuration file")?;
    config
        .validate()
        .context("configuration validation failed")?;

    // Initialize tracing
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    // Startup banner
    info!("========================================");
    info!("  mergewatch Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Repository    : {}", config.repo_path.display());
    info!("Remote branch : {}", config.remote_ref());
    info!("Poll interval : {}s", config.poll_interval().as_secs());
    info!("Auto-update   : {}", config.auto_update);
    info!("Dirty-tree sim: {}", config.simulate_dirty_tree);
    info!("Log level     : {}", log_level);
    info!("========================================");

    // Build the detector; this probes git once for protocol selection
    let runner = ProcessRunner::new(&config.repo_path);
    let detector = Arc::new(ConflictDetector::new(config, runner).await);
    info!(protocol = %detector.protocol(), "conflict detector initialized");

    if args.once {
        return run_once(&detector).await;
    }

    // Log every published event as a JSON line
    let logger_handle = tokio::spawn(event_logger(detector.subscribe()));

    // Command channel (signal handlers -> scheduler)
    let (command_tx, command_rx) = tokio::sync::mpsc::channel::<SchedulerCommand>(16);

    // SIGHUP reloads the config file
    #[cfg(unix)]
    {
        let config_path = args.config.clone();
        let command_tx = command_tx.clone();
        tokio::spawn(async move {
            let mut hangups = signals::hangup_stream();
            while hangups.recv().await.is_some() {
                info!("received SIGHUP, reloading configuration");
                match WatchConfig::load_from_file(&config_path)
                    .and_then(|c| c.validate().map(|()| c))
                {
                    Ok(config) => {
                        if command_tx
                            .send(SchedulerCommand::Reload(config))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "reload failed, keeping previous configuration"),
                }
            }
        });
    }

    // Create a shutdown notify for cooperative cancellation
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let scheduler_shutdown = shutdown.clone();

    let mut sched = Scheduler::new(detector.clone(), command_rx);
    let scheduler_handle = tokio::spawn(async move {
        sched.run(scheduler_shutdown).await;
    });

    // Wait for shutdown signal
    signals::wait_for_shutdown().await;
    info!("Shutdown signal received, stopping...");
    shutdown.notify_waiters();

    // Wait for the scheduler to finish its current cycle (up to 10s)
    match tokio::time::timeout(std::time::Duration::from_secs(10), scheduler_handle).await {
        Ok(Ok(())) => info!("scheduler stopped gracefully"),
        Ok(Err(e)) => warn!("scheduler task error: {}", e),
        Err(_) => warn!("scheduler did not stop within 10s, forcing shutdown"),
    }
    logger_handle.abort();

    info!("mergewatch daemon stopped.");
    Ok(())
}

/// Single-shot mode: one cycle, snapshot on stdout, status as exit code.
async fn run_once(detector: &ConflictDetector<ProcessRunner>) -> Result<()> {
    detector.run_cycle().await;
    let snapshot = detector
        .current()
        .context("detection cycle produced no snapshot")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    let code = match snapshot.status {
        DetectionStatus::Conflicts => 1,
        DetectionStatus::Error => 2,
        _ => 0,
    };
    std::process::exit(code);
}

/// Drain the detector's event stream into the log, one JSON line per event.
async fn event_logger(mut rx: tokio::sync::broadcast::Receiver<DetectorEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!(event = %json, "detector event"),
                Err(e) => warn!(error = %e, "failed to serialize detector event"),
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event logger lagged, events dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
