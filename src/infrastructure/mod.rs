//! Infrastructure layer - Adapters and process wiring
//!
//! - Persistence: SQLite and in-memory inventory stores
//! - Grant scheduler: the timer loop behind offer batches
//! - Config: environment configuration
//! - State: service wiring shared with the request layer

pub mod config;
pub mod grant_scheduler;
pub mod persistence;
pub mod state;
