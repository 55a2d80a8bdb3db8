// src/connection/stats.rs

//! Counters describing the outbound link since startup.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds all live counters of a connection manager.
#[derive(Debug, Default)]
pub(crate) struct ConnectionCounters {
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    write_failures: AtomicU64,
    frames_received: AtomicU64,
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    reconnects: AtomicU64,
}

impl ConnectionCounters {
    pub(crate) fn increment_packets_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_packets_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_connect_attempts(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_connects(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Packets accepted into the write queue.
    pub packets_sent: u64,
    /// Packets released without being queued.
    pub packets_dropped: u64,
    pub write_failures: u64,
    pub frames_received: u64,
    /// Every attempt that reached the connector, successful or not.
    pub connect_attempts: u64,
    pub connects: u64,
    /// Reconnects forced by session loss, inactivity or an explicit request.
    pub reconnects: u64,
}
