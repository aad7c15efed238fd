//! Application services - Use case implementations
//!
//! Each service holds its outbound ports as trait objects and returns domain
//! entities or an `InventoryError`.

pub mod claim_service;
pub mod friendship_service;
pub mod grant_service;
pub mod profile_service;
pub mod trade_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use claim_service::ClaimService;
pub use friendship_service::FriendshipService;
pub use grant_service::GrantService;
pub use profile_service::ProfileService;
pub use trade_service::TradeService;
