// src/core/state/bridge.rs

//! Defines the central `BridgeState` struct, holding every shared component.

use super::status::BridgeStatus;
use crate::config::Config;
use crate::connection::{
    ConnectionManager, ConnectionSettings, Connector, FrameHandler, LoggingFrameHandler,
    SendOutcome, Target, TcpConnector,
};
use crate::core::errors::BridgeError;
use crate::core::integration::{HandlerRegistry, MappedHandler};
use crate::core::logging::LogControl;
use crate::core::overrides::OverrideResolver;
use crate::core::scheduler::{Scheduler, ShutdownReport};
use crate::core::subject::{Artifact, SubjectId, SubjectKind};
use crate::core::translation::{MappingTranslator, TranslationEngine, Translator};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tracing::{info, warn};

/// The pluggable collaborators of a bridge.
pub struct BridgeComponents {
    pub connector: Arc<dyn Connector>,
    pub frame_handler: Arc<dyn FrameHandler>,
    pub translator: Arc<dyn Translator>,
}

impl BridgeComponents {
    /// TCP transport, logging frame handler and the configured mapping table.
    pub fn from_config(config: &Config) -> Self {
        Self {
            connector: Arc::new(TcpConnector),
            frame_handler: Arc::new(LoggingFrameHandler),
            translator: Arc::new(MappingTranslator::from_config(config)),
        }
    }
}

/// The application context. Built once at startup and shared by handle.
pub struct BridgeState {
    pub config: Arc<Config>,
    pub scheduler: Arc<Scheduler>,
    pub connection: Arc<ConnectionManager>,
    pub engine: Arc<TranslationEngine>,
    pub overrides: Arc<OverrideResolver<Artifact>>,
    pub handlers: HandlerRegistry,
    log_control: Option<LogControl>,
    debug: AtomicBool,
    started_at: Instant,
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("connection", &self.connection)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl BridgeState {
    /// Builds the bridge with its default collaborators. Must run inside a
    /// Tokio runtime; failing to create the scheduler aborts startup.
    pub fn initialize(
        config: Config,
        log_control: Option<LogControl>,
    ) -> Result<Arc<Self>, BridgeError> {
        let components = BridgeComponents::from_config(&config);
        Self::with_components(config, components, log_control)
    }

    pub fn with_components(
        config: Config,
        components: BridgeComponents,
        log_control: Option<LogControl>,
    ) -> Result<Arc<Self>, BridgeError> {
        let pool_size = Scheduler::pool_size_for(config.scheduler.threads);
        let scheduler = Scheduler::new(pool_size)?;

        let connection = ConnectionManager::new(
            Target::new(config.connection.host.clone(), config.connection.port),
            ConnectionSettings::from_config(&config),
            components.connector,
            Arc::clone(&scheduler),
            components.frame_handler,
        );

        let overrides = Arc::new(OverrideResolver::new());
        let engine = Arc::new(TranslationEngine::from_config(
            &config,
            Arc::clone(&overrides),
            components.translator,
        ));
        let handlers = HandlerRegistry::new(Arc::clone(&overrides));

        let state = Arc::new(Self {
            debug: AtomicBool::new(config.debug),
            config: Arc::new(config),
            scheduler,
            connection,
            engine,
            overrides,
            handlers,
            log_control,
            started_at: Instant::now(),
        });
        state.load_integrations();
        Ok(state)
    }

    /// Registers a `MappedHandler` for every configured integration.
    /// Returns how many were loaded.
    pub fn load_integrations(&self) -> usize {
        let mut loaded = 0;
        for integration in &self.config.integrations {
            let handler = MappedHandler::new(
                integration.id.clone(),
                integration.mappings.clone(),
                integration.enabled,
            );
            if self.handlers.register(Arc::new(handler)).is_ok() {
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!("Loaded {} integration handlers.", loaded);
        }
        loaded
    }

    /// Starts the connection manager.
    pub async fn start(&self) -> Result<(), BridgeError> {
        self.connection.initialize().await
    }

    /// Translates `subject` and sends the artifact over the link.
    pub async fn translate_and_send(&self, kind: SubjectKind, subject: &SubjectId) -> SendOutcome {
        self.engine
            .translate_and_send(kind, subject, &self.connection)
            .await
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            state: self.connection.state(),
            target: self.connection.target().to_string(),
            peer: self.connection.peer(),
            connection: self.connection.stats(),
            translations: self.engine.total_translations(),
            tiers: self.engine.tiers(),
            integrations: self.handlers.loaded(),
            overrides: self.overrides.len(),
            scheduled_tasks: self.scheduler.active_tasks(),
            pool_size: self.scheduler.pool_size(),
            debug: self.is_debug(),
            uptime: self.started_at.elapsed(),
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Acquire)
    }

    /// Switches debug logging. Without a log control only the flag changes.
    pub fn set_debug(&self, enabled: bool) -> Result<(), BridgeError> {
        if let Some(control) = &self.log_control {
            control.set_debug(enabled)?;
        }
        self.debug.store(enabled, Ordering::Release);
        Ok(())
    }

    /// Flips debug logging and returns the new state.
    pub fn toggle_debug(&self) -> Result<bool, BridgeError> {
        let enabled = !self.is_debug();
        self.set_debug(enabled)?;
        Ok(enabled)
    }

    pub fn toggle_integration(&self, id: &str) -> Result<bool, BridgeError> {
        self.handlers.toggle(id)
    }

    /// Sweeps expired cache entries, then re-establishes the link.
    /// Returns the number of entries removed.
    pub async fn reload(&self) -> Result<usize, BridgeError> {
        let removed = self.engine.cleanup();
        info!("Reload: removed {} expired cache entries. Reconnecting.", removed);
        self.connection.reconnect().await?;
        Ok(removed)
    }

    /// Stops the bridge in order: background work, the link, the worker pool,
    /// then a final cache sweep. Idempotent.
    pub async fn shutdown(&self) -> ShutdownReport {
        let grace = self.config.scheduler.shutdown_grace;
        let report = self.connection.shutdown(grace).await;
        if report.timed_out() {
            warn!(
                "{} background tasks were force-cancelled during shutdown.",
                report.forced
            );
        }
        let removed = self.engine.cleanup();
        info!(
            "Bridge stopped. {} expired cache entries released.",
            removed
        );
        report
    }
}
