// src/core/errors.rs

//! Defines the primary error type for the entire bridge.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The main error enum, representing every failure the bridge can report.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The outbound connection could not be established. Recovered by the reconnect loop.
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailure { target: String, reason: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A single packet could not be written. The packet is dropped, never retried.
    #[error("Write failed: {0}")]
    WriteFailure(String),

    /// A translation could not be computed. Resolved per call through a fallback value.
    #[error("Translation failed: {0}")]
    ComputeFailure(String),

    #[error("Invalid configuration value: {0}")]
    ConfigValidation(String),

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Scheduler is closed and no longer accepts tasks")]
    SchedulerClosed,

    #[error("Connection manager has been shut down")]
    ShutDown,

    /// An unrecoverable failure while creating the runtime substrate.
    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("No translation is known for '{0}'")]
    NotMapped(String),

    #[error("Unknown integration handler '{0}'")]
    UnknownHandler(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it lives behind an Arc.
impl Clone for BridgeError {
    fn clone(&self) -> Self {
        match self {
            BridgeError::Io(e) => BridgeError::Io(Arc::clone(e)),
            BridgeError::ConnectFailure { target, reason } => BridgeError::ConnectFailure {
                target: target.clone(),
                reason: reason.clone(),
            },
            BridgeError::Timeout(s) => BridgeError::Timeout(s.clone()),
            BridgeError::WriteFailure(s) => BridgeError::WriteFailure(s.clone()),
            BridgeError::ComputeFailure(s) => BridgeError::ComputeFailure(s.clone()),
            BridgeError::ConfigValidation(s) => BridgeError::ConfigValidation(s.clone()),
            BridgeError::ShutdownTimeout(d) => BridgeError::ShutdownTimeout(*d),
            BridgeError::SchedulerClosed => BridgeError::SchedulerClosed,
            BridgeError::ShutDown => BridgeError::ShutDown,
            BridgeError::Startup(s) => BridgeError::Startup(s.clone()),
            BridgeError::NotMapped(s) => BridgeError::NotMapped(s.clone()),
            BridgeError::UnknownHandler(s) => BridgeError::UnknownHandler(s.clone()),
            BridgeError::Internal(s) => BridgeError::Internal(s.clone()),
        }
    }
}

impl PartialEq for BridgeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BridgeError::Io(e1), BridgeError::Io(e2)) => e1.to_string() == e2.to_string(),
            (
                BridgeError::ConnectFailure {
                    target: t1,
                    reason: r1,
                },
                BridgeError::ConnectFailure {
                    target: t2,
                    reason: r2,
                },
            ) => t1 == t2 && r1 == r2,
            (BridgeError::Timeout(s1), BridgeError::Timeout(s2)) => s1 == s2,
            (BridgeError::WriteFailure(s1), BridgeError::WriteFailure(s2)) => s1 == s2,
            (BridgeError::ComputeFailure(s1), BridgeError::ComputeFailure(s2)) => s1 == s2,
            (BridgeError::ConfigValidation(s1), BridgeError::ConfigValidation(s2)) => s1 == s2,
            (BridgeError::ShutdownTimeout(d1), BridgeError::ShutdownTimeout(d2)) => d1 == d2,
            (BridgeError::Startup(s1), BridgeError::Startup(s2)) => s1 == s2,
            (BridgeError::NotMapped(s1), BridgeError::NotMapped(s2)) => s1 == s2,
            (BridgeError::UnknownHandler(s1), BridgeError::UnknownHandler(s2)) => s1 == s2,
            (BridgeError::Internal(s1), BridgeError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(Arc::new(e))
    }
}

impl From<tokio::time::error::Elapsed> for BridgeError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        BridgeError::Timeout(e.to_string())
    }
}
