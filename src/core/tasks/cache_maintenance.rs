// src/core/tasks/cache_maintenance.rs

use crate::core::scheduler::PeriodicTask;
use crate::core::translation::TranslationEngine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Periodically sweeps expired entries out of every cache tier and logs the
/// tier statistics.
pub struct CacheMaintenanceTask {
    engine: Arc<TranslationEngine>,
    interval: Duration,
}

impl CacheMaintenanceTask {
    pub fn new(engine: Arc<TranslationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl PeriodicTask for CacheMaintenanceTask {
    fn name(&self) -> &'static str {
        "cache-maintenance"
    }

    fn period(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) {
        let removed = self.engine.cleanup();
        for tier in self.engine.tiers() {
            debug!(
                "Cache '{}': {}/{} entries, hits {}, misses {}, hit rate {:.2}, evictions {}.",
                tier.kind.tier_name(),
                tier.len,
                tier.capacity,
                tier.stats.hits,
                tier.stats.misses,
                tier.stats.hit_rate(),
                tier.stats.evictions
            );
        }
        if removed > 0 {
            debug!("Cache maintenance removed {} expired entries.", removed);
        }
    }
}
