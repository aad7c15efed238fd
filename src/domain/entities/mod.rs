//! Domain entities - Core business objects with identity

mod asset;
mod friend_request;
mod species;
mod trade_proposal;
mod user;

pub use asset::{Asset, AssetDetail, AssetState, AssetStateError};
pub use friend_request::{FriendRequest, FriendRequests};
pub use species::{Form, Species, Sprites};
pub use trade_proposal::{TradeProposal, TradeProposals, TradeReceipt};
pub use user::{User, UserProfile, UserSummary};
