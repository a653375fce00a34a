// resq Daemon - Main Entry Point
// Runs a worker pool against the configured store until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use resq_core::application::{shutdown_channel, Dispatcher};
use resq_daemon::{builtin_registry, init_tracing, load_settings, open_queue_store};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest wait for in-flight jobs after the shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "resq-daemon", about = "resq worker daemon", version)]
struct Args {
    /// Settings file (toml, json or yaml); RESQ_* variables override it
    #[arg(short, long, env = "RESQ_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Logging
    init_tracing()?;
    info!("resq daemon v{} starting...", VERSION);

    // 2. Settings
    let settings = load_settings(args.config.as_deref())?;
    info!(
        store_url = %settings.store_url,
        max_workers = settings.max_workers,
        queues = ?settings.queues,
        "Settings loaded"
    );

    // 3. Store and tasks
    let store = open_queue_store(&settings).await?;
    let registry = builtin_registry();
    info!(tasks = ?registry.names(), "Tasks registered");

    // 4. Dispatcher
    let dispatcher = Dispatcher::new(store, settings.dispatcher_config()?)
        .context("Worker pool construction failed")?;
    let metrics = dispatcher.metrics();

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut pool_handle = tokio::spawn(async move { dispatcher.run(registry, shutdown_rx).await });

    info!("System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal, or for the pool to stop on its own
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown signal received. Finishing in-flight jobs...");
        }
        finished = &mut pool_handle => {
            match finished {
                Ok(Ok(())) => warn!("Worker pool stopped before shutdown was requested"),
                Ok(Err(e)) => error!(error = %e, "Worker pool failed"),
                Err(e) => error!(error = %e, "Worker pool task aborted"),
            }
            return Ok(());
        }
    }

    // 6. Graceful shutdown
    shutdown_tx.shutdown();
    match tokio::time::timeout(SHUTDOWN_GRACE, pool_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "Worker pool failed during shutdown"),
        Ok(Err(e)) => error!(error = %e, "Worker pool task aborted"),
        Err(_) => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Shutdown grace period elapsed with jobs still running"
        ),
    }

    info!(metrics = ?metrics.snapshot(), "Shutdown complete.");
    Ok(())
}
