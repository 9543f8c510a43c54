// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replicated key-value store node (kvrd)
//!
//! Runs one leader or follower until SIGTERM or SIGINT.

use std::path::Path;

use clap::Parser;
use kvr_daemon::{lifecycle, Args, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::from_args(&args)?;

    // Write startup marker to log (before tracing setup, so it precedes this run's lines)
    if let Some(log_file) = &config.log_file {
        write_startup_marker(log_file)?;
    }

    let log_guard = setup_logging(&config)?;

    info!(
        node_id = %config.node_id,
        role = %config.role,
        data_dir = %config.data_dir.display(),
        "Starting kvrd"
    );

    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!(error = %e, "Failed to start node");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(addr = %daemon.local_addr(), "Node ready");

    // Signal ready for a parent process waiting on startup
    println!("READY {}", daemon.local_addr());

    daemon
        .serve_until(async {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            }
        })
        .await;
    daemon.shutdown().await?;

    info!("Node stopped");
    Ok(())
}

/// Startup marker prefix written to the log file before anything else.
/// Full format: "--- kvrd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- kvrd: starting (pid: ";

fn write_startup_marker(log_file: &Path) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously so it is visible even if the process
/// exits before the log writer flushes.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Some(log_file) = &config.log_file else {
        eprintln!("error: failed to start node: {}", error);
        return;
    };
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start node: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = match &config.log_file {
        Some(log_file) => {
            let dir = match log_file.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            let name = log_file.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("log file has no name: {}", log_file.display()),
                )
            })?;
            std::fs::create_dir_all(dir)?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let with_ansi = config.log_file.is_none();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(with_ansi))
        .init();

    Ok(guard)
}
