// src/server/context.rs

use crate::core::scheduler::TaskHandle;
use crate::core::state::BridgeState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds everything the signal loop needs to run and to stop the bridge.
pub struct BridgeContext {
    pub state: Arc<BridgeState>,
    /// Scheduler tasks started at boot: maintenance and warm-ups.
    pub scheduled: Vec<TaskHandle>,
    /// Tasks that live outside the scheduler pool, such as the metrics server.
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub shutdown_tx: broadcast::Sender<()>,
}
