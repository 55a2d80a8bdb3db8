// src/core/cache/mod.rs

//! A memoizing key/value store for expensive translations.
//!
//! `TranslationCache` guarantees that at most one computation per key runs at a
//! time: concurrent requesters for the same key attach to the running
//! computation and receive its result. Failed computations are never stored.
//!
//! Entries are bounded both by count (LRU, per segment) and by time
//! (expire-after-access). Expiry is checked lazily on lookup and eagerly by
//! `cleanup()`; the size bound is enforced on insert. The store is split into
//! independently locked segments so that evicting one key never blocks access
//! to keys in other segments, and no lock is held while a value is computed.

mod entry;
mod flight;
pub mod sizing;
mod stats;

pub use sizing::{derive_capacity, segment_count_for};
pub use stats::CacheStats;

use crate::core::errors::BridgeError;
use crate::core::metrics;
use crate::core::scheduler::{Scheduler, TaskHandle};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use entry::CacheEntry;
use flight::{FlightGuard, Landing, await_landing};
use lru::LruCache;
use parking_lot::Mutex;
use stats::CacheCounters;
use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type Segment<K, V> = Mutex<LruCache<K, CacheEntry<V>>>;

// How a request for a missing key is served.
enum Role<V> {
    Cached(V),
    Follower(watch::Receiver<Landing<V>>),
    Leader(watch::Sender<Landing<V>>),
}

pub struct TranslationCache<K, V>
where
    K: Hash + Eq,
{
    name: String,
    capacity: usize,
    ttl: Duration,
    segments: Box<[Segment<K, V>]>,
    hasher: RandomState,
    in_flight: DashMap<K, watch::Receiver<Landing<V>>>,
    counters: CacheCounters,
}

impl<K, V> Debug for TranslationCache<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl<K, V> TranslationCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` entries (at least one), each
    /// expiring once it has not been accessed for `ttl`.
    pub fn new(name: impl Into<String>, capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        let segment_count = segment_count_for(capacity);
        let segments = (0..segment_count)
            .map(|i| {
                let share = sizing::segment_capacity(capacity, segment_count, i);
                Mutex::new(LruCache::new(
                    NonZeroUsize::new(share).unwrap_or(NonZeroUsize::MIN),
                ))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let name = name.into();
        debug!(
            "Cache '{}' created: capacity {}, ttl {:?}, {} segments.",
            name, capacity, ttl, segment_count
        );
        Self {
            name,
            capacity,
            ttl,
            segments,
            hasher: RandomState::new(),
            in_flight: DashMap::new(),
            counters: CacheCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Returns true if a fresh value is stored. Does not touch recency or stats.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.segment(key)
            .lock()
            .peek(key)
            .is_some_and(|e| !e.is_expired(now, self.ttl))
    }

    /// Looks up a fresh value without computing one. Counts as a hit or a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lookup(key);
        self.record_lookup(found.is_some());
        found
    }

    /// Returns the cached value for `key`, computing it with `compute` if needed.
    ///
    /// Concurrent calls for the same key share one computation. When the
    /// computation fails (or its leader is cancelled), every caller gets its
    /// own `fallback()` and nothing is cached.
    pub async fn get_or_compute<F, Fut, E, FB>(&self, key: K, compute: F, fallback: FB) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
        FB: FnOnce() -> V,
    {
        match self.try_get_or_compute(key, compute).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Cache '{}' serving fallback: {}", self.name, e);
                fallback()
            }
        }
    }

    /// Like `get_or_compute`, but reports a failed computation to the caller.
    pub async fn try_get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        if let Some(value) = self.lookup(&key) {
            self.record_lookup(true);
            return Ok(value);
        }
        self.record_lookup(false);

        let role = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(flight) => Role::Follower(flight.get().clone()),
            Entry::Vacant(slot) => {
                // A leader may have stored the value between our lookup and this point.
                match self.peek_fresh(&key) {
                    Some(value) => Role::Cached(value),
                    None => {
                        let (tx, rx) = watch::channel(Landing::Pending);
                        slot.insert(rx);
                        Role::Leader(tx)
                    }
                }
            }
        };

        match role {
            Role::Cached(value) => Ok(value),
            Role::Follower(rx) => await_landing(rx).await.map_err(BridgeError::ComputeFailure),
            Role::Leader(tx) => {
                let guard = FlightGuard::new(&self.in_flight, key.clone(), tx);
                match compute().await {
                    Ok(value) => {
                        self.store(key, value.clone());
                        guard.land(Landing::Ready(value.clone()));
                        Ok(value)
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        warn!(
                            "Cache '{}' failed to compute {:?}: {}",
                            self.name, key, reason
                        );
                        guard.land(Landing::Failed(reason.clone()));
                        Err(BridgeError::ComputeFailure(reason))
                    }
                }
            }
        }
    }

    /// Removes a single entry. Returns true if it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.segment(key).lock().pop(key).is_some()
    }

    pub fn invalidate_all(&self) {
        for segment in self.segments.iter() {
            segment.lock().clear();
        }
        info!("Cache '{}' invalidated.", self.name);
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for segment in self.segments.iter() {
            let mut segment = segment.lock();
            let expired: Vec<K> = segment
                .iter()
                .filter(|(_, e)| e.is_expired(now, self.ttl))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                segment.pop(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.record_evictions(removed as u64);
            debug!(
                "Cache '{}' cleanup removed {} expired entries.",
                self.name, removed
            );
        }
        removed
    }

    /// Pre-populates `keys` in the background. Never blocks the caller; failed
    /// keys are logged and left uncached.
    pub fn warm_up<F, Fut, E>(
        self: &Arc<Self>,
        scheduler: &Scheduler,
        keys: Vec<K>,
        compute: F,
    ) -> Result<TaskHandle, BridgeError>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.warm_up_after(scheduler, Duration::ZERO, keys, compute)
    }

    /// Same as `warm_up`, starting after `delay`.
    pub fn warm_up_after<F, Fut, E>(
        self: &Arc<Self>,
        scheduler: &Scheduler,
        delay: Duration,
        keys: Vec<K>,
        compute: F,
    ) -> Result<TaskHandle, BridgeError>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cache = Arc::clone(self);
        scheduler.schedule_once("cache-warmup", delay, async move {
            let started = Instant::now();
            let total = keys.len();
            let mut loaded = 0usize;
            let mut failed = 0usize;
            for key in keys {
                if cache.contains(&key) {
                    continue;
                }
                let compute_key = key.clone();
                match cache
                    .try_get_or_compute(key.clone(), || compute(compute_key))
                    .await
                {
                    Ok(_) => loaded += 1,
                    Err(e) => {
                        failed += 1;
                        warn!("Warm-up of cache '{}' failed for {:?}: {}", cache.name, key, e);
                    }
                }
            }
            info!(
                "Cache '{}' warm-up finished in {:?}: {} of {} keys loaded, {} failed.",
                cache.name,
                started.elapsed(),
                loaded,
                total,
                failed
            );
        })
    }

    fn segment(&self, key: &K) -> &Segment<K, V> {
        let index = (self.hasher.hash_one(key) as usize) % self.segments.len();
        &self.segments[index]
    }

    // Returns a fresh value and refreshes its access time. Expired entries are removed.
    fn lookup(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut segment = self.segment(key).lock();
        let lived = match segment.get_mut(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                entry.touch(now);
                return Some(entry.value.clone());
            }
            Some(entry) => now.saturating_duration_since(entry.created_at),
        };
        segment.pop(key);
        drop(segment);
        self.record_evictions(1);
        debug!(
            "Cache '{}' expired {:?} on access after {:?}.",
            self.name, key, lived
        );
        None
    }

    fn peek_fresh(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.segment(key)
            .lock()
            .peek(key)
            .filter(|e| !e.is_expired(now, self.ttl))
            .map(|e| e.value.clone())
    }

    fn store(&self, key: K, value: V) {
        let now = Instant::now();
        let mut segment = self.segment(&key).lock();
        let displaced = segment.push(key, CacheEntry::new(value, now));
        if let Some((old_key, _)) = displaced
            && !segment.contains(&old_key)
        {
            drop(segment);
            self.record_evictions(1);
            debug!("Cache '{}' evicted {:?} to stay within capacity.", self.name, old_key);
        }
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.counters.record_hit();
            metrics::CACHE_HITS_TOTAL
                .with_label_values(&[self.name.as_str()])
                .inc();
        } else {
            self.counters.record_miss();
            metrics::CACHE_MISSES_TOTAL
                .with_label_values(&[self.name.as_str()])
                .inc();
        }
    }

    fn record_evictions(&self, count: u64) {
        self.counters.record_evictions(count);
        metrics::CACHE_EVICTIONS_TOTAL
            .with_label_values(&[self.name.as_str()])
            .inc_by(count as f64);
    }
}
