//! Value objects - Immutable objects defined by their attributes

mod grant_policy;
mod ids;
mod rarity;

pub use grant_policy::GrantPolicy;
pub use ids::*;
pub use rarity::Rarity;
