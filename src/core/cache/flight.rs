// src/core/cache/flight.rs

//! Bookkeeping for computations that are currently running.
//!
//! The first requester of a missing key becomes the leader and publishes a
//! `Landing` through a watch channel. Every other requester for the same key
//! subscribes to that channel instead of computing the value again.

use dashmap::DashMap;
use std::hash::Hash;
use tokio::sync::watch;

/// The state of an in-flight computation as seen by waiters.
#[derive(Debug, Clone)]
pub(crate) enum Landing<V> {
    Pending,
    Ready(V),
    /// The computation returned an error. Nothing was cached.
    Failed(String),
    /// The leader was dropped before finishing.
    Abandoned,
}

/// Held by the leader. Publishing a landing or dropping the guard releases all waiters.
pub(crate) struct FlightGuard<'a, K, V>
where
    K: Hash + Eq,
{
    in_flight: &'a DashMap<K, watch::Receiver<Landing<V>>>,
    key: K,
    tx: Option<watch::Sender<Landing<V>>>,
}

impl<'a, K, V> FlightGuard<'a, K, V>
where
    K: Hash + Eq,
{
    pub(crate) fn new(
        in_flight: &'a DashMap<K, watch::Receiver<Landing<V>>>,
        key: K,
        tx: watch::Sender<Landing<V>>,
    ) -> Self {
        Self {
            in_flight,
            key,
            tx: Some(tx),
        }
    }

    pub(crate) fn land(mut self, landing: Landing<V>) {
        self.finish(landing);
    }

    fn finish(&mut self, landing: Landing<V>) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(landing);
            self.in_flight.remove(&self.key);
        }
    }
}

impl<K, V> Drop for FlightGuard<'_, K, V>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        self.finish(Landing::Abandoned);
    }
}

/// Waits for the leader to publish a result. `Err` carries the reason the
/// computation did not produce a value.
pub(crate) async fn await_landing<V: Clone>(
    mut rx: watch::Receiver<Landing<V>>,
) -> Result<V, String> {
    loop {
        let landing = rx.borrow_and_update().clone();
        match landing {
            Landing::Ready(value) => return Ok(value),
            Landing::Failed(reason) => return Err(reason),
            Landing::Abandoned => return Err("computation was abandoned".to_string()),
            Landing::Pending => {}
        }
        if rx.changed().await.is_err() {
            return match rx.borrow().clone() {
                Landing::Ready(value) => Ok(value),
                Landing::Failed(reason) => Err(reason),
                _ => Err("computation was abandoned".to_string()),
            };
        }
    }
}
