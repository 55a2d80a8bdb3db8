// src/server/signal_loop.rs

//! Waits for a termination signal and stops the bridge in order.

use super::context::BridgeContext;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// How long non-scheduler tasks get to finish after the shutdown signal.
const BACKGROUND_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocks until SIGINT or SIGTERM, or until a background task dies, then
/// shuts everything down.
pub async fn run(mut ctx: BridgeContext) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            }
        }
    }

    for handle in &ctx.scheduled {
        handle.cancel();
    }

    let report = ctx.state.shutdown().await;
    info!(
        "Scheduler stopped: {} tasks drained, {} forced.",
        report.drained, report.forced
    );

    if ctx.shutdown_tx.send(()).is_err() {
        // No receivers: the metrics server is disabled or already gone.
        info!("No background listeners to notify.");
    }

    if tokio::time::timeout(BACKGROUND_SHUTDOWN_TIMEOUT, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        ctx.background_tasks.abort_all();
    }
    info!("Bridge shutdown complete.");
    Ok(())
}
