// src/core/tasks/health.rs

use crate::connection::{ConnectionManager, ConnectionState};
use crate::core::scheduler::PeriodicTask;
use async_trait::async_trait;
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Detects a dead or idle link and triggers reconnection.
///
/// A connected link with no traffic for longer than the inactivity threshold
/// is forcibly reconnected. A disconnected link gets a fresh attempt. While an
/// attempt is already in flight the check does nothing.
pub struct HealthMonitor {
    manager: Weak<ConnectionManager>,
    interval: Duration,
    inactivity_threshold: Duration,
}

impl HealthMonitor {
    pub fn new(
        manager: Weak<ConnectionManager>,
        interval: Duration,
        inactivity_threshold: Duration,
    ) -> Self {
        Self {
            manager,
            interval,
            inactivity_threshold,
        }
    }
}

#[async_trait]
impl PeriodicTask for HealthMonitor {
    fn name(&self) -> &'static str {
        "health-monitor"
    }

    fn period(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if manager.is_shut_down() {
            return;
        }

        match manager.state() {
            ConnectionState::Connected => {
                let idle = manager.last_activity_age();
                if idle > self.inactivity_threshold {
                    warn!(
                        "No activity on the link to {} for {:?} (threshold {:?}). Forcing reconnect.",
                        manager.target(),
                        idle,
                        self.inactivity_threshold
                    );
                    if let Err(e) = manager.reconnect().await {
                        debug!("Health-triggered reconnect failed: {}", e);
                    }
                }
            }
            ConnectionState::Disconnected => {
                info!(
                    "Health check found the link to {} down. Attempting to connect.",
                    manager.target()
                );
                if let Err(e) = manager.connect().await {
                    debug!("Health-triggered connect failed: {}", e);
                }
            }
            ConnectionState::Connecting => {
                debug!("Health check skipped: a connection attempt is in flight.");
            }
        }
    }
}
