// src/server/mod.rs

use crate::config::Config;
use crate::core::logging::LogControl;
use anyhow::Result;

mod context;
mod initialization;
mod metrics_server;
mod signal_loop;
mod spawner;

pub use context::BridgeContext;

/// The main bridge startup function, orchestrating all setup phases.
pub async fn run(config: Config, log_control: Option<LogControl>) -> Result<()> {
    // 1. Build the shared state and bring up the link.
    let mut ctx = initialization::setup(config, log_control).await?;

    // 2. Start maintenance, warm-up and the metrics endpoint.
    spawner::spawn_all(&mut ctx)?;

    // 3. Run until a termination signal arrives, then stop in order.
    signal_loop::run(ctx).await
}
