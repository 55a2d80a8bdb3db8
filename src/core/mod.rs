// src/core/mod.rs

//! The central module containing the core logic and data structures of the bridge.

pub mod cache;
pub mod errors;
pub mod integration;
pub mod logging;
pub mod metrics;
pub mod overrides;
pub mod scheduler;
pub mod state;
pub mod subject;
pub mod tasks;
pub mod translation;

pub use errors::BridgeError;
pub use scheduler::Scheduler;
pub use state::BridgeState;
pub use subject::{Artifact, SubjectId, SubjectKind};
