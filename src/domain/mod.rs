//! Domain layer - Core business logic with no external dependencies
//!
//! This layer contains:
//! - Entities: User, Asset, Species, FriendRequest, TradeProposal
//! - Value Objects: identifiers, rarity and the grant policy

pub mod entities;
pub mod value_objects;
