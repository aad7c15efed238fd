//! Pokeroll Engine - Collection, claim and trade core
//!
//! Players receive a batch of candidate creatures on a timer, claim exactly
//! one of each batch, befriend each other and trade claimed creatures with
//! friends. The request layer, identity exchange and catalog ingestion live
//! outside this crate and call into `AppState`'s services.

pub mod application;
pub mod domain;
pub mod infrastructure;
