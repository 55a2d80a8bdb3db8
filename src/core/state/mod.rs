// src/core/state/mod.rs

//! The shared application context and its status snapshot.

mod bridge;
mod status;

pub use bridge::{BridgeComponents, BridgeState};
pub use status::BridgeStatus;
