// src/core/overrides.rs

//! A registry of producers that take precedence over the translation cache.
//!
//! When a producer is registered and enabled for a subject, its output is used
//! directly and the cache is never consulted for that subject. Producers are
//! invoked on every request; their results are not cached.

use crate::core::subject::SubjectId;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A function supplying the result for a subject.
pub type Producer<V> = Arc<dyn Fn(&SubjectId) -> V + Send + Sync>;

struct OverrideEntry<V> {
    producer: Producer<V>,
    enabled: bool,
    /// The integration handler that installed this entry, if any.
    owner: Option<String>,
}

pub struct OverrideResolver<V> {
    entries: DashMap<SubjectId, OverrideEntry<V>>,
}

impl<V> Default for OverrideResolver<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for OverrideResolver<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideResolver")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V> OverrideResolver<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers an enabled producer for `subject`, replacing any previous one.
    /// Returns true if a producer was replaced.
    pub fn register(&self, subject: SubjectId, producer: Producer<V>) -> bool {
        self.insert(subject, producer, None)
    }

    /// Registers a producer on behalf of an integration handler.
    pub fn register_owned(
        &self,
        subject: SubjectId,
        owner: impl Into<String>,
        producer: Producer<V>,
    ) -> bool {
        self.insert(subject, producer, Some(owner.into()))
    }

    fn insert(&self, subject: SubjectId, producer: Producer<V>, owner: Option<String>) -> bool {
        debug!("Registering override for '{}'.", subject);
        let entry = OverrideEntry {
            producer,
            enabled: true,
            owner,
        };
        self.entries.insert(subject, entry).is_some()
    }

    /// Removes the producer for `subject`. Returns true if one was registered.
    pub fn unregister(&self, subject: &str) -> bool {
        self.entries.remove(subject).is_some()
    }

    /// Removes every producer installed by `owner` and returns how many were removed.
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.owner.as_deref() != Some(owner));
        before.saturating_sub(self.entries.len())
    }

    /// Flips the enabled flag for `subject`. Returns true if a producer was
    /// registered and toggled; read the new state with `is_enabled`.
    pub fn toggle(&self, subject: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(subject) else {
            return false;
        };
        entry.enabled = !entry.enabled;
        info!(
            "Override for '{}' is now {}.",
            subject,
            if entry.enabled { "enabled" } else { "disabled" }
        );
        true
    }

    /// Sets the enabled flag for `subject`. Returns false if nothing is registered.
    pub fn set_enabled(&self, subject: &str, enabled: bool) -> bool {
        match self.entries.get_mut(subject) {
            Some(mut entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Sets the enabled flag on every producer installed by `owner`.
    pub fn set_owner_enabled(&self, owner: &str, enabled: bool) -> usize {
        let mut changed = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.owner.as_deref() == Some(owner) {
                entry.enabled = enabled;
                changed += 1;
            }
        }
        changed
    }

    /// Returns the producer for `subject` if one is registered and enabled.
    pub fn resolve(&self, subject: &str) -> Option<Producer<V>> {
        self.entries
            .get(subject)
            .filter(|entry| entry.enabled)
            .map(|entry| Arc::clone(&entry.producer))
    }

    pub fn is_registered(&self, subject: &str) -> bool {
        self.entries.contains_key(subject)
    }

    pub fn is_enabled(&self, subject: &str) -> bool {
        self.entries.get(subject).is_some_and(|e| e.enabled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered subjects, sorted.
    pub fn subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<SubjectId> = self.entries.iter().map(|e| e.key().clone()).collect();
        subjects.sort();
        subjects
    }
}
