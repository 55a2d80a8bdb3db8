// src/core/state/status.rs

use crate::connection::{ConnectionState, ConnectionStats};
use crate::core::integration::HandlerInfo;
use crate::core::translation::TierStatus;
use std::fmt;
use std::time::Duration;

/// A snapshot of the bridge, as reported by status queries.
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    pub state: ConnectionState,
    pub target: String,
    pub peer: Option<String>,
    pub connection: ConnectionStats,
    pub translations: u64,
    pub tiers: Vec<TierStatus>,
    pub integrations: Vec<HandlerInfo>,
    pub overrides: usize,
    pub scheduled_tasks: usize,
    pub pool_size: usize,
    pub debug: bool,
    pub uptime: Duration,
}

impl BridgeStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Connection")?;
        writeln!(f, "state:{}", self.state)?;
        writeln!(f, "target:{}", self.target)?;
        if let Some(peer) = &self.peer {
            writeln!(f, "peer:{peer}")?;
        }
        writeln!(f, "packets_sent:{}", self.connection.packets_sent)?;
        writeln!(f, "packets_dropped:{}", self.connection.packets_dropped)?;
        writeln!(f, "write_failures:{}", self.connection.write_failures)?;
        writeln!(f, "frames_received:{}", self.connection.frames_received)?;
        writeln!(f, "connect_attempts:{}", self.connection.connect_attempts)?;
        writeln!(f, "reconnects:{}", self.connection.reconnects)?;

        writeln!(f, "# Translation")?;
        writeln!(f, "translations:{}", self.translations)?;
        writeln!(f, "overrides:{}", self.overrides)?;
        for tier in &self.tiers {
            writeln!(
                f,
                "cache_{}:entries={},capacity={},hits={},misses={},hit_rate={:.2},evictions={}",
                tier.kind.tier_name(),
                tier.len,
                tier.capacity,
                tier.stats.hits,
                tier.stats.misses,
                tier.stats.hit_rate(),
                tier.stats.evictions
            )?;
        }

        writeln!(f, "# Integrations")?;
        for handler in &self.integrations {
            writeln!(
                f,
                "{}:enabled={},subjects={}",
                handler.id, handler.enabled, handler.subjects
            )?;
        }

        writeln!(f, "# Runtime")?;
        writeln!(f, "scheduled_tasks:{}", self.scheduled_tasks)?;
        writeln!(f, "pool_size:{}", self.pool_size)?;
        writeln!(f, "debug:{}", self.debug)?;
        write!(f, "uptime_in_seconds:{}", self.uptime.as_secs())
    }
}
