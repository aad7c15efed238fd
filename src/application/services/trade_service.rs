//! Trade Service - Trade proposals between friends and atomic swaps
//!
//! Accepting a trade moves both assets in one store transaction and purges
//! every other pending proposal that names either asset, since those now
//! describe assets their stated holder no longer has.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::ports::inbound::InventoryError;
use crate::application::ports::outbound::{InventoryStorePort, StoreError};
use crate::domain::entities::{TradeProposal, TradeProposals, TradeReceipt};
use crate::domain::value_objects::{AssetId, TradeProposalId, UserId};

pub struct TradeService {
    store: Arc<dyn InventoryStorePort>,
}

impl TradeService {
    pub fn new(store: Arc<dyn InventoryStorePort>) -> Self {
        Self { store }
    }

    /// Propose swapping `proposer_asset` for `counterpart_asset`.
    ///
    /// Ownership of the two assets is not checked here; `accept` refuses the
    /// swap if either asset is not held by the side the proposal names.
    #[instrument(skip(self))]
    pub async fn propose(
        &self,
        proposer: UserId,
        proposer_asset: AssetId,
        counterpart: UserId,
        counterpart_asset: AssetId,
    ) -> Result<TradeProposal, InventoryError> {
        if proposer == counterpart {
            return Err(InventoryError::SelfReference);
        }
        if !self.store.are_friends(proposer, counterpart).await? {
            return Err(InventoryError::NotFriends);
        }
        for asset in [proposer_asset, counterpart_asset] {
            if self.store.get_asset(asset).await?.is_none() {
                return Err(InventoryError::NotFound(format!("asset {}", asset)));
            }
        }

        let proposal = TradeProposal::new(proposer, proposer_asset, counterpart, counterpart_asset);
        if self.store.find_trade_proposal(&proposal).await?.is_some() {
            return Err(InventoryError::Conflict(
                "an identical trade proposal is already pending".to_string(),
            ));
        }
        self.store.create_trade_proposal(&proposal).await?;
        info!(
            proposal_id = %proposal.id,
            %proposer,
            %counterpart,
            "Created trade proposal"
        );
        Ok(proposal)
    }

    /// Accept a proposal. Only its counterpart may accept it.
    ///
    /// A proposal that disappears after it was loaded was purged by a trade
    /// that committed first (or cancelled); the caller lost that race and
    /// gets `Conflict`.
    #[instrument(skip(self))]
    pub async fn accept(
        &self,
        proposal_id: TradeProposalId,
        acting_user: UserId,
    ) -> Result<TradeReceipt, InventoryError> {
        let proposal = self.load(proposal_id).await?;
        if proposal.counterpart != acting_user {
            return Err(InventoryError::Unauthorized);
        }

        let receipt = self
            .store
            .execute_trade(proposal_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => InventoryError::Conflict(format!(
                    "trade proposal {} is no longer pending",
                    proposal_id
                )),
                other => other.into(),
            })?;
        info!(
            proposal_id = %proposal_id,
            proposer = %receipt.proposal.proposer,
            counterpart = %receipt.proposal.counterpart,
            invalidated = receipt.invalidated.len(),
            "Trade completed"
        );
        Ok(receipt)
    }

    /// Cancel (or decline) a proposal. Either party may do so.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        proposal_id: TradeProposalId,
        acting_user: UserId,
    ) -> Result<(), InventoryError> {
        let proposal = self.load(proposal_id).await?;
        if !proposal.is_party(acting_user) {
            return Err(InventoryError::Unauthorized);
        }
        self.store.delete_trade_proposal(proposal_id).await?;
        debug!(%proposal_id, %acting_user, "Trade proposal cancelled");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_proposals(&self, user: UserId) -> Result<TradeProposals, InventoryError> {
        Ok(self.store.list_trade_proposals(user).await?)
    }

    async fn load(&self, proposal_id: TradeProposalId) -> Result<TradeProposal, InventoryError> {
        self.store
            .get_trade_proposal(proposal_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("trade proposal {}", proposal_id)))
    }
}
