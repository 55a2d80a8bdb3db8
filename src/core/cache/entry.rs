// src/core/cache/entry.rs

use std::time::Duration;
use tokio::time::Instant;

/// A stored value with the timestamps used for expire-after-access.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) created_at: Instant,
    pub(crate) last_access: Instant,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_access: now,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    pub(crate) fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_access) > ttl
    }
}
