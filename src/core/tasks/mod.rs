// src/core/tasks/mod.rs

//! Periodic background tasks that run on the scheduler.

pub mod cache_maintenance;
pub mod health;
