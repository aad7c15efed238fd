//! Inventory store port - The authoritative persisted state of the game
//!
//! Every method that touches more than one row is atomic: implementations
//! must apply all of its writes or none of them, and must serialize it
//! against other operations on the same users and assets. Losers of a race
//! get `StoreError::Conflict`, never a torn state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{
    Asset, FriendRequest, FriendRequests, Species, TradeProposal, TradeProposals, TradeReceipt,
    User, UserProfile, UserSummary,
};
use crate::domain::value_objects::{
    AssetId, FriendRequestId, SpeciesId, TradeProposalId, UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outcome of an attempt to hand a user a new offer batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The batch was stored, in slot order
    Granted(Vec<Asset>),
    /// The user still had pending offers; nothing was written
    AlreadyPending,
}

#[async_trait]
pub trait InventoryStorePort: Send + Sync {
    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Insert the user unless one with the same external id exists; returns
    /// the stored user either way.
    async fn upsert_user(&self, user: &User) -> Result<User, StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError>;

    /// Delete a user with their assets, friendships and proposals.
    /// Returns false if the user did not exist.
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;

    async fn set_preferred_form(
        &self,
        user: UserId,
        species: SpeciesId,
        form_index: u32,
    ) -> Result<(), StoreError>;

    /// Load the user with owned assets, pending offers (slot order) and
    /// friends, each asset hydrated with species name, form, types and
    /// sprites.
    async fn load_profile(&self, id: UserId) -> Result<Option<UserProfile>, StoreError>;

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    /// Insert or replace a species with its forms (used by catalog ingestion)
    async fn save_species(&self, species: &Species) -> Result<(), StoreError>;

    async fn get_species(&self, id: SpeciesId) -> Result<Option<Species>, StoreError>;

    // -------------------------------------------------------------------------
    // Offers
    // -------------------------------------------------------------------------

    async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError>;

    /// Pending offers of a user in slot order
    async fn pending_offers(&self, user: UserId) -> Result<Vec<Asset>, StoreError>;

    /// Store `offers` as the user's batch only if the user has no pending
    /// offer. The check and the insert are one atomic step.
    async fn insert_offers_if_clear(
        &self,
        user: UserId,
        offers: &[Asset],
    ) -> Result<GrantOutcome, StoreError>;

    /// Turn `offer` into an owned asset of `user`, delete the user's other
    /// pending offers and set `next_grant_at`, atomically. Fails with
    /// `Conflict` if the offer is no longer pending for the user.
    async fn claim_offer(
        &self,
        user: UserId,
        offer: AssetId,
        next_grant_at: DateTime<Utc>,
    ) -> Result<Asset, StoreError>;

    // -------------------------------------------------------------------------
    // Friendships
    // -------------------------------------------------------------------------

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError>;

    async fn list_friends(&self, user: UserId) -> Result<Vec<UserSummary>, StoreError>;

    /// Delete both directed edges. Idempotent.
    async fn remove_friendship(&self, a: UserId, b: UserId) -> Result<(), StoreError>;

    /// Fails with `Conflict` if a request for the same ordered pair exists
    async fn create_friend_request(&self, request: &FriendRequest) -> Result<(), StoreError>;

    async fn find_friend_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<Option<FriendRequest>, StoreError>;

    async fn get_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequest>, StoreError>;

    async fn list_friend_requests(&self, user: UserId) -> Result<FriendRequests, StoreError>;

    /// Create both friendship edges and delete the request together with any
    /// mirror request for the same pair. Fails with `NotFound` if missing.
    async fn accept_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<FriendRequest, StoreError>;

    /// Returns false if the request did not exist
    async fn delete_friend_request(&self, id: FriendRequestId) -> Result<bool, StoreError>;

    // -------------------------------------------------------------------------
    // Trades
    // -------------------------------------------------------------------------

    /// Fails with `Conflict` if a proposal with the same terms exists
    async fn create_trade_proposal(&self, proposal: &TradeProposal) -> Result<(), StoreError>;

    /// Pending proposal with the same proposer, counterpart and assets
    async fn find_trade_proposal(
        &self,
        terms: &TradeProposal,
    ) -> Result<Option<TradeProposal>, StoreError>;

    async fn get_trade_proposal(
        &self,
        id: TradeProposalId,
    ) -> Result<Option<TradeProposal>, StoreError>;

    async fn list_trade_proposals(&self, user: UserId) -> Result<TradeProposals, StoreError>;

    /// Swap ownership of the two referenced assets, delete the proposal and
    /// purge every other proposal naming either asset, atomically.
    ///
    /// Fails with `NotFound` only if the proposal is gone, and with
    /// `Conflict` if either asset is gone or no longer owned by its stated
    /// holder.
    async fn execute_trade(&self, id: TradeProposalId) -> Result<TradeReceipt, StoreError>;

    /// Returns false if the proposal did not exist
    async fn delete_trade_proposal(&self, id: TradeProposalId) -> Result<bool, StoreError>;
}
