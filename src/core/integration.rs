// src/core/integration.rs

//! Pluggable integration handlers for third-party content.
//!
//! A handler claims a set of subjects and translates them itself. Handlers are
//! registered explicitly at startup; registering one installs an override
//! producer for every subject it claims, so its output bypasses the cache.

use crate::core::errors::BridgeError;
use crate::core::overrides::{OverrideResolver, Producer};
use crate::core::subject::{Artifact, SubjectId};
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// The fixed capability set every integration handler provides.
pub trait IntegrationHandler: Send + Sync {
    /// A unique identifier, usually the integration's namespace.
    fn id(&self) -> &str;

    /// Prepares the handler. A failure keeps the handler from being loaded.
    fn initialize(&self) -> Result<(), BridgeError>;

    /// The subjects this handler translates.
    fn subjects(&self) -> Vec<SubjectId>;

    fn translate(&self, subject: &SubjectId) -> Artifact;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);
}

/// A summary of a loaded handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub id: String,
    pub enabled: bool,
    pub subjects: usize,
}

/// A handler backed by a static table of subject to target identifiers.
#[derive(Debug)]
pub struct MappedHandler {
    id: String,
    mappings: HashMap<SubjectId, Bytes>,
    enabled: AtomicBool,
}

impl MappedHandler {
    pub fn new(id: impl Into<String>, mappings: HashMap<String, String>, enabled: bool) -> Self {
        let mappings = mappings
            .into_iter()
            .map(|(source, target)| (SubjectId::from(source), Bytes::from(target)))
            .collect();
        Self {
            id: id.into(),
            mappings,
            enabled: AtomicBool::new(enabled),
        }
    }
}

impl IntegrationHandler for MappedHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&self) -> Result<(), BridgeError> {
        if self.mappings.is_empty() {
            return Err(BridgeError::ConfigValidation(format!(
                "integration '{}' declares no mappings",
                self.id
            )));
        }
        Ok(())
    }

    fn subjects(&self) -> Vec<SubjectId> {
        self.mappings.keys().cloned().collect()
    }

    fn translate(&self, subject: &SubjectId) -> Artifact {
        self.mappings.get(subject).cloned().unwrap_or_default()
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

/// Holds every loaded handler and keeps the override resolver in sync with them.
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn IntegrationHandler>>,
    resolver: Arc<OverrideResolver<Artifact>>,
}

impl HandlerRegistry {
    pub fn new(resolver: Arc<OverrideResolver<Artifact>>) -> Self {
        Self {
            handlers: DashMap::new(),
            resolver,
        }
    }

    /// Initializes `handler` and installs its producers. Returns the number of
    /// subjects it claims. A handler that fails to initialize is not loaded.
    pub fn register(&self, handler: Arc<dyn IntegrationHandler>) -> Result<usize, BridgeError> {
        let id = handler.id().to_string();
        if let Err(e) = handler.initialize() {
            warn!("Failed to initialize integration '{}': {}", id, e);
            return Err(e);
        }

        // Replacing a handler drops the producers of the old one first.
        if self.handlers.remove(&id).is_some() {
            self.resolver.unregister_owner(&id);
        }

        let enabled = handler.is_enabled();
        let subjects = handler.subjects();
        for subject in &subjects {
            let h = Arc::clone(&handler);
            let producer: Producer<Artifact> = Arc::new(move |s: &SubjectId| h.translate(s));
            self.resolver
                .register_owned(subject.clone(), id.clone(), producer);
        }
        if !enabled {
            self.resolver.set_owner_enabled(&id, false);
        }

        info!(
            "Loaded integration '{}' with {} subjects ({}).",
            id,
            subjects.len(),
            if enabled { "enabled" } else { "disabled" }
        );
        self.handlers.insert(id, handler);
        Ok(subjects.len())
    }

    /// Unloads a handler and its producers.
    pub fn unregister(&self, id: &str) -> bool {
        match self.handlers.remove(id) {
            Some(_) => {
                let removed = self.resolver.unregister_owner(id);
                info!("Unloaded integration '{}' ({} overrides removed).", id, removed);
                true
            }
            None => false,
        }
    }

    /// Flips a handler between enabled and disabled. Returns the new state.
    pub fn toggle(&self, id: &str) -> Result<bool, BridgeError> {
        let handler = self
            .handlers
            .get(id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| BridgeError::UnknownHandler(id.to_string()))?;
        let enabled = !handler.is_enabled();
        handler.set_enabled(enabled);
        self.resolver.set_owner_enabled(id, enabled);
        info!(
            "Integration '{}' {}.",
            id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(enabled)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn IntegrationHandler>> {
        self.handlers.get(id).map(|h| Arc::clone(h.value()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Summaries of all loaded handlers, sorted by id.
    pub fn loaded(&self) -> Vec<HandlerInfo> {
        let mut loaded: Vec<HandlerInfo> = self
            .handlers
            .iter()
            .map(|h| HandlerInfo {
                id: h.key().clone(),
                enabled: h.is_enabled(),
                subjects: h.subjects().len(),
            })
            .collect();
        loaded.sort_by(|a, b| a.id.cmp(&b.id));
        loaded
    }
}
