//! Claim Service - Turns one pending offer into an owned asset

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::application::ports::inbound::InventoryError;
use crate::application::ports::outbound::{GrantSchedulerPort, InventoryStorePort, StoreError};
use crate::domain::entities::Asset;
use crate::domain::value_objects::{GrantPolicy, UserId};

pub struct ClaimService {
    store: Arc<dyn InventoryStorePort>,
    scheduler: Arc<dyn GrantSchedulerPort>,
    policy: GrantPolicy,
}

impl ClaimService {
    pub fn new(
        store: Arc<dyn InventoryStorePort>,
        scheduler: Arc<dyn GrantSchedulerPort>,
        policy: GrantPolicy,
    ) -> Self {
        Self {
            store,
            scheduler,
            policy,
        }
    }

    /// The user's current offers; claim indices refer to this order
    #[instrument(skip(self))]
    pub async fn pending_offers(&self, user: UserId) -> Result<Vec<Asset>, InventoryError> {
        Ok(self.store.pending_offers(user).await?)
    }

    /// Claim the offer at `offer_index`.
    ///
    /// The chosen offer becomes owned (same id), the rest of the batch is
    /// deleted and the next grant is scheduled one interval from now. If two
    /// claims race for the same batch only the first commit wins; the other
    /// gets `AlreadyClaimed`.
    #[instrument(skip(self))]
    pub async fn claim(&self, user: UserId, offer_index: usize) -> Result<Asset, InventoryError> {
        if self.store.get_user(user).await?.is_none() {
            return Err(InventoryError::NotFound(format!("user {}", user)));
        }

        let offers = self.store.pending_offers(user).await?;
        if offers.is_empty() {
            return Err(InventoryError::NoPendingOffers);
        }
        let offer = offers.get(offer_index).ok_or(InventoryError::OutOfRange {
            index: offer_index,
            len: offers.len(),
        })?;

        let next_grant_at = self.policy.next_grant_after(Utc::now());
        let claimed = match self.store.claim_offer(user, offer.id, next_grant_at).await {
            Ok(asset) => asset,
            Err(StoreError::Conflict(reason)) => {
                warn!(user_id = %user, %reason, "Lost claim race");
                return Err(InventoryError::AlreadyClaimed);
            }
            Err(e) => return Err(e.into()),
        };

        self.scheduler.arm(user, next_grant_at).await;
        info!(
            user_id = %user,
            asset_id = %claimed.id,
            species = %claimed.species_id,
            discarded = offers.len() - 1,
            "Claimed offer"
        );
        Ok(claimed)
    }
}
