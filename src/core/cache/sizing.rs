// src/core/cache/sizing.rs

//! Startup-time capacity calculations.
//!
//! Capacity is derived once from the probed memory budget and never adjusted
//! afterwards. The per-entry size is an estimate, so the result is an
//! approximation of the real footprint.

/// Caches smaller than this per segment collapse to fewer segments so the
/// LRU bound stays exact.
pub const MIN_ENTRIES_PER_SEGMENT: usize = 64;

/// `floor(fraction * budget / entry_size)`, capped at `tier_max` and never below 1.
pub fn derive_capacity(
    memory_fraction: f64,
    budget_bytes: u64,
    entry_size_bytes: usize,
    tier_max: usize,
) -> usize {
    let entry_size = entry_size_bytes.max(1) as f64;
    let derived = (memory_fraction * budget_bytes as f64 / entry_size).floor();
    let derived = if derived.is_finite() && derived > 0.0 {
        derived.min(usize::MAX as f64) as usize
    } else {
        0
    };
    derived.min(tier_max).max(1)
}

/// The number of independently locked segments for a cache of `capacity` entries.
pub fn segment_count_for(capacity: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.min(capacity / MIN_ENTRIES_PER_SEGMENT).max(1)
}

/// Splits `capacity` across `segments` so the shares add up exactly.
pub(crate) fn segment_capacity(capacity: usize, segments: usize, index: usize) -> usize {
    let base = capacity / segments;
    let extra = usize::from(index < capacity % segments);
    (base + extra).max(1)
}
