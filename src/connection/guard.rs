// src/connection/guard.rs

//! Defines `ConnectingGuard`, an RAII guard serializing connection attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Holds the manager's "connecting" flag for the duration of one attempt.
///
/// Only one guard can exist per flag at a time, so overlapping connect and
/// reconnect requests collapse into the attempt that owns the guard. The flag
/// is released when the guard is dropped, including when the attempt's future
/// is cancelled mid-flight.
pub(crate) struct ConnectingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ConnectingGuard<'a> {
    /// Claims the flag, or returns `None` if another attempt holds it.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        debug!("Connection attempt finished; connecting flag released.");
    }
}
