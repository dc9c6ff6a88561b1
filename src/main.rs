use anyhow::{Context, bail};
use clipforge::verifier::FfprobeVerifier;
use clipforge::{JobStore, RenderConfig, RenderQueue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = clipforge::logger::init_logging();

    if !clipforge::encoder::check_dependencies() {
        bail!("ffmpeg and ffprobe must be installed and on PATH");
    }

    let config = RenderConfig::load();
    config.validate().context("invalid configuration")?;
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output dir {}", config.output_dir.display()))?;

    let store = Arc::new(JobStore::new(&config.jobs_dir).context("opening job store")?);
    let queue = RenderQueue::new(Arc::clone(&store), &config, Arc::new(FfprobeVerifier));

    queue.start();
    let report = queue.recover().context("recovering persisted jobs")?;
    info!(
        "Render service up: {} jobs re-queued, {} failed as interrupted",
        report.requeued, report.failed
    );

    let sweep_queue = Arc::clone(&queue);
    let sweep_interval = Duration::from_secs(config.retention.sweep_interval_secs);
    let retention = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match sweep_queue.cleanup_old() {
                Ok(0) => {}
                Ok(n) => info!("Retention sweep removed {} old jobs", n),
                Err(e) => error!("Retention sweep failed: {}", e),
            }
        }
    });

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received");

    retention.abort();
    queue.shutdown();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
