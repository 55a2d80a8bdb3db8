// src/server/spawner.rs

//! Starts the bridge's long-running background work.

use super::context::BridgeContext;
use super::metrics_server;
use crate::core::subject::{SubjectId, SubjectKind};
use crate::core::tasks::cache_maintenance::CacheMaintenanceTask;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

/// Schedules cache maintenance and warm-up, and spawns the metrics server.
pub fn spawn_all(ctx: &mut BridgeContext) -> Result<()> {
    let state = &ctx.state;
    let config = &state.config;

    // --- Metrics Server ---
    if config.metrics.enabled {
        let metrics_state = Arc::clone(state);
        let shutdown_rx = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Cache Maintenance ---
    let maintenance =
        CacheMaintenanceTask::new(Arc::clone(&state.engine), config.cache.maintenance_interval);
    let handle = state
        .scheduler
        .schedule_periodic(maintenance)
        .map_err(|e| anyhow!("Failed to schedule cache maintenance: {}", e))?;
    ctx.scheduled.push(handle);

    // --- Warm-up ---
    let warmup = &config.translation.warmup;
    for kind in SubjectKind::ALL {
        let subjects: Vec<SubjectId> = warmup
            .subjects(kind)
            .iter()
            .map(|s| SubjectId::from(s.as_str()))
            .collect();
        if subjects.is_empty() {
            continue;
        }
        info!(
            "Warming up {} {} in {:?}.",
            subjects.len(),
            kind.tier_name(),
            warmup.delay
        );
        let handle = state
            .engine
            .warm_up(&state.scheduler, kind, subjects, warmup.delay)
            .map_err(|e| anyhow!("Failed to schedule {} warm-up: {}", kind, e))?;
        ctx.scheduled.push(handle);
    }

    info!("All background tasks have been scheduled.");
    Ok(())
}
