// src/core/logging.rs

//! Runtime control over the global log filter.

use crate::core::errors::BridgeError;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, reload};

/// The reload handle of the global filter layer.
pub type LogReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Switches the global log filter at runtime.
#[derive(Clone)]
pub struct LogControl {
    handle: Arc<LogReloadHandle>,
    base_level: Arc<Mutex<String>>,
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("base_level", &*self.base_level.lock())
            .finish()
    }
}

impl LogControl {
    /// `base_level` is the filter restored when debug logging is turned off.
    pub fn new(handle: Arc<LogReloadHandle>, base_level: impl Into<String>) -> Self {
        Self {
            handle,
            base_level: Arc::new(Mutex::new(base_level.into())),
        }
    }

    /// Installs an arbitrary filter directive, e.g. `info,bedrock_bridge=debug`.
    pub fn set_level(&self, directive: &str) -> Result<(), BridgeError> {
        let filter = EnvFilter::try_new(directive).map_err(|e| {
            BridgeError::ConfigValidation(format!("invalid log filter directive: {e}"))
        })?;
        if let Err(e) = self.handle.reload(filter) {
            let msg = format!("Failed to reload log level: {e}");
            error!("{msg}");
            return Err(BridgeError::Internal(msg));
        }
        *self.base_level.lock() = directive.to_string();
        info!("Log level dynamically changed to '{}'", directive);
        Ok(())
    }

    /// Turns debug logging on, or restores the base level.
    pub fn set_debug(&self, enabled: bool) -> Result<(), BridgeError> {
        let directive = if enabled {
            "debug".to_string()
        } else {
            self.base_level.lock().clone()
        };
        let filter = EnvFilter::try_new(&directive).map_err(|e| {
            BridgeError::ConfigValidation(format!("invalid log filter directive: {e}"))
        })?;
        self.handle
            .reload(filter)
            .map_err(|e| BridgeError::Internal(format!("Failed to reload log level: {e}")))?;
        info!(
            "Debug logging {}.",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}
