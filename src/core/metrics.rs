// src/core/metrics.rs

//! Defines and registers Prometheus metrics for bridge monitoring.
//!
//! This module uses `lazy_static` so that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};
use tracing::error;

lazy_static! {
    // --- Connection ---
    /// 1 while the outbound link is connected, 0 otherwise.
    pub static ref CONNECTED: Gauge =
        register_gauge!("bridge_connected", "Outbound connection state (1 for connected, 0 otherwise).").expect("bridge_connected is registered once");
    pub static ref PACKETS_SENT_TOTAL: Counter =
        register_counter!("bridge_packets_sent_total", "Total number of packets submitted for writing.").expect("bridge_packets_sent_total is registered once");
    pub static ref PACKETS_DROPPED_TOTAL: Counter =
        register_counter!("bridge_packets_dropped_total", "Total number of packets dropped because the link was down or saturated.").expect("bridge_packets_dropped_total is registered once");
    pub static ref WRITE_FAILURES_TOTAL: Counter =
        register_counter!("bridge_write_failures_total", "Total number of packets whose write failed or timed out.").expect("bridge_write_failures_total is registered once");
    pub static ref FRAMES_RECEIVED_TOTAL: Counter =
        register_counter!("bridge_frames_received_total", "Total number of inbound frames received.").expect("bridge_frames_received_total is registered once");
    pub static ref CONNECT_ATTEMPTS_TOTAL: Counter =
        register_counter!("bridge_connect_attempts_total", "Total number of outbound connection attempts.").expect("bridge_connect_attempts_total is registered once");
    pub static ref RECONNECTS_TOTAL: Counter =
        register_counter!("bridge_reconnects_total", "Total number of reconnects forced by loss or inactivity.").expect("bridge_reconnects_total is registered once");

    // --- Translation ---
    pub static ref TRANSLATIONS_TOTAL: Counter =
        register_counter!("bridge_translations_total", "Total number of translation requests served.").expect("bridge_translations_total is registered once");
    pub static ref OVERRIDES_TOTAL: Counter =
        register_counter!("bridge_overrides_total", "Total number of translations served by an override producer.").expect("bridge_overrides_total is registered once");

    // --- Cache ---
    pub static ref CACHE_HITS_TOTAL: CounterVec =
        register_counter_vec!("bridge_cache_hits_total", "Total number of cache hits, labeled by cache.", &["cache"]).expect("bridge_cache_hits_total is registered once");
    pub static ref CACHE_MISSES_TOTAL: CounterVec =
        register_counter_vec!("bridge_cache_misses_total", "Total number of cache misses, labeled by cache.", &["cache"]).expect("bridge_cache_misses_total is registered once");
    pub static ref CACHE_EVICTIONS_TOTAL: CounterVec =
        register_counter_vec!("bridge_cache_evictions_total", "Total number of entries evicted by size or expiry, labeled by cache.", &["cache"]).expect("bridge_cache_evictions_total is registered once");

    // --- Scheduler ---
    pub static ref SCHEDULED_TASKS: Gauge =
        register_gauge!("bridge_scheduled_tasks", "Number of scheduled or running background tasks.").expect("bridge_scheduled_tasks is registered once");
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| {
            error!("Failed to encode metrics: {}", e);
            String::new()
        })
}
