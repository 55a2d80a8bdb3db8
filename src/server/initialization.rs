// src/server/initialization.rs

//! Builds the bridge state and makes the first connection attempt.

use super::context::BridgeContext;
use crate::config::Config;
use crate::core::logging::LogControl;
use crate::core::state::BridgeState;
use anyhow::{Result, anyhow};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all bridge components before the signal loop starts.
///
/// An unreachable target is not an error here: the connection manager keeps
/// retrying in the background. Only a bridge that cannot be built is fatal.
pub async fn setup(config: Config, log_control: Option<LogControl>) -> Result<BridgeContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = BridgeState::initialize(config, log_control)
        .map_err(|e| anyhow!("Failed to initialize bridge state: {}", e))?;
    info!("Bridge state initialized.");

    state
        .start()
        .await
        .map_err(|e| anyhow!("Failed to start the connection manager: {}", e))?;
    if !state.connection.is_connected() {
        warn!(
            "Target {} is not reachable yet. Retrying in the background.",
            state.connection.target()
        );
    }

    Ok(BridgeContext {
        state,
        scheduled: Vec::new(),
        background_tasks: JoinSet::new(),
        shutdown_tx,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Bridging to {}:{} (connect timeout {:?}).",
        config.connection.host,
        config.connection.port,
        config.connection.connect_timeout()
    );
    info!(
        "Memory budget for caches: {} bytes ({:.2} MB) at fraction {}.",
        config.available_memory,
        config.available_memory as f64 / 1024.0 / 1024.0,
        config.cache.memory_fraction
    );
    if config.debug {
        info!("Debug mode is enabled.");
    }
}
