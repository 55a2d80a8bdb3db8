// src/core/translation.rs

//! The translation pipeline: overrides first, then the tiered caches.

use crate::config::Config;
use crate::connection::{ConnectionManager, SendOutcome};
use crate::core::cache::{CacheStats, TranslationCache, derive_capacity};
use crate::core::errors::BridgeError;
use crate::core::metrics;
use crate::core::overrides::OverrideResolver;
use crate::core::scheduler::{Scheduler, TaskHandle};
use crate::core::subject::{Artifact, SubjectId, SubjectKind};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Produces the wire representation of a subject.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, kind: SubjectKind, subject: &SubjectId)
    -> Result<Artifact, BridgeError>;

    /// The placeholder served when `translate` fails.
    fn fallback(&self, kind: SubjectKind, subject: &SubjectId) -> Artifact;
}

/// Translates through a static table of source to target identifiers.
#[derive(Debug, Clone)]
pub struct MappingTranslator {
    mappings: HashMap<SubjectId, Bytes>,
    fallback: Bytes,
}

impl MappingTranslator {
    pub fn new(mappings: HashMap<String, String>, fallback: impl Into<String>) -> Self {
        let mappings = mappings
            .into_iter()
            .map(|(source, target)| (SubjectId::from(source), Bytes::from(target)))
            .collect();
        Self {
            mappings,
            fallback: Bytes::from(fallback.into()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.translation.mappings.clone(),
            config.translation.fallback.clone(),
        )
    }
}

#[async_trait]
impl Translator for MappingTranslator {
    async fn translate(
        &self,
        _kind: SubjectKind,
        subject: &SubjectId,
    ) -> Result<Artifact, BridgeError> {
        self.mappings
            .get(subject)
            .cloned()
            .ok_or_else(|| BridgeError::NotMapped(subject.to_string()))
    }

    fn fallback(&self, _kind: SubjectKind, _subject: &SubjectId) -> Artifact {
        self.fallback.clone()
    }
}

/// The statistics of one cache tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierStatus {
    pub kind: SubjectKind,
    pub stats: CacheStats,
    pub len: usize,
    pub capacity: usize,
}

pub type ArtifactCache = TranslationCache<SubjectId, Artifact>;

/// Routes translation requests through overrides and the tier caches.
pub struct TranslationEngine {
    blocks: Arc<ArtifactCache>,
    items: Arc<ArtifactCache>,
    entities: Arc<ArtifactCache>,
    overrides: Arc<OverrideResolver<Artifact>>,
    translator: Arc<dyn Translator>,
    translations: AtomicU64,
}

impl TranslationEngine {
    pub fn new(
        blocks: Arc<ArtifactCache>,
        items: Arc<ArtifactCache>,
        entities: Arc<ArtifactCache>,
        overrides: Arc<OverrideResolver<Artifact>>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            blocks,
            items,
            entities,
            overrides,
            translator,
            translations: AtomicU64::new(0),
        }
    }

    /// Builds the three tiers with capacities derived from the memory budget.
    pub fn from_config(
        config: &Config,
        overrides: Arc<OverrideResolver<Artifact>>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let cache = &config.cache;
        let build = |kind: SubjectKind| {
            let tier = cache.tier(kind);
            let capacity = derive_capacity(
                cache.memory_fraction,
                config.available_memory,
                tier.entry_size_bytes,
                tier.max_entries,
            );
            info!(
                "Cache tier '{}' sized to {} entries (ttl {:?}).",
                kind.tier_name(),
                capacity,
                tier.ttl
            );
            Arc::new(TranslationCache::new(kind.tier_name(), capacity, tier.ttl))
        };
        Self::new(
            build(SubjectKind::Block),
            build(SubjectKind::Item),
            build(SubjectKind::Entity),
            overrides,
            translator,
        )
    }

    pub fn cache(&self, kind: SubjectKind) -> &Arc<ArtifactCache> {
        match kind {
            SubjectKind::Block => &self.blocks,
            SubjectKind::Item => &self.items,
            SubjectKind::Entity => &self.entities,
        }
    }

    pub fn overrides(&self) -> &Arc<OverrideResolver<Artifact>> {
        &self.overrides
    }

    /// Translates `subject`. Never fails: an enabled override wins, otherwise
    /// the tier cache computes or returns the value, with the translator's
    /// fallback standing in for failed computations.
    pub async fn translate(&self, kind: SubjectKind, subject: &SubjectId) -> Artifact {
        self.translations.fetch_add(1, Ordering::Relaxed);
        metrics::TRANSLATIONS_TOTAL.inc();

        if let Some(producer) = self.overrides.resolve(subject.as_str()) {
            metrics::OVERRIDES_TOTAL.inc();
            debug!("Serving {} '{}' from an override.", kind, subject);
            return producer(subject);
        }

        let translator = &self.translator;
        self.cache(kind)
            .get_or_compute(
                subject.clone(),
                || translator.translate(kind, subject),
                || translator.fallback(kind, subject),
            )
            .await
    }

    /// Translates `subject` and hands the result to the connection.
    pub async fn translate_and_send(
        &self,
        kind: SubjectKind,
        subject: &SubjectId,
        connection: &ConnectionManager,
    ) -> SendOutcome {
        let artifact = self.translate(kind, subject).await;
        connection.send(artifact)
    }

    /// Schedules a background warm-up of `subjects` after `delay`.
    pub fn warm_up(
        &self,
        scheduler: &Scheduler,
        kind: SubjectKind,
        subjects: Vec<SubjectId>,
        delay: Duration,
    ) -> Result<TaskHandle, BridgeError> {
        let translator = Arc::clone(&self.translator);
        self.cache(kind)
            .warm_up_after(scheduler, delay, subjects, move |subject: SubjectId| {
                let translator = Arc::clone(&translator);
                async move { translator.translate(kind, &subject).await }
            })
    }

    /// Removes expired entries from every tier.
    pub fn cleanup(&self) -> usize {
        SubjectKind::ALL
            .iter()
            .map(|kind| self.cache(*kind).cleanup())
            .sum()
    }

    pub fn invalidate_all(&self) {
        for kind in SubjectKind::ALL {
            self.cache(kind).invalidate_all();
        }
    }

    pub fn total_translations(&self) -> u64 {
        self.translations.load(Ordering::Relaxed)
    }

    pub fn tiers(&self) -> Vec<TierStatus> {
        SubjectKind::ALL
            .iter()
            .map(|kind| {
                let cache = self.cache(*kind);
                TierStatus {
                    kind: *kind,
                    stats: cache.stats(),
                    len: cache.len(),
                    capacity: cache.capacity(),
                }
            })
            .collect()
    }
}
