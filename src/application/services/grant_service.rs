//! Grant Service - Materializes offer batches when a user's grant is due

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::ports::inbound::InventoryError;
use crate::application::ports::outbound::{GrantOutcome, InventoryStorePort};
use crate::domain::entities::Asset;
use crate::domain::value_objects::{GrantPolicy, SpeciesId, UserId};

/// Rolls and stores offer batches. Invoked by the grant scheduler when a
/// user's `next_grant_at` has passed.
pub struct GrantService {
    store: Arc<dyn InventoryStorePort>,
    policy: GrantPolicy,
}

impl GrantService {
    pub fn new(store: Arc<dyn InventoryStorePort>, policy: GrantPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &GrantPolicy {
        &self.policy
    }

    /// Grant a new batch unless the user still has pending offers.
    ///
    /// Safe to call any number of times: duplicate wake-ups after a restart
    /// or a re-arm end in `GrantOutcome::AlreadyPending`.
    #[instrument(skip(self))]
    pub async fn grant_if_clear(&self, user: UserId) -> Result<GrantOutcome, InventoryError> {
        if !self.store.pending_offers(user).await?.is_empty() {
            debug!(user_id = %user, "Offers still pending, skipping grant");
            return Ok(GrantOutcome::AlreadyPending);
        }

        let offers = self.roll_offers(user).await?;
        let outcome = self.store.insert_offers_if_clear(user, &offers).await?;
        match &outcome {
            GrantOutcome::Granted(batch) => {
                let shiny = batch.iter().filter(|a| a.rarity.is_shiny()).count();
                info!(user_id = %user, offers = batch.len(), shiny, "Granted offer batch");
            }
            GrantOutcome::AlreadyPending => {
                debug!(user_id = %user, "Lost grant race, batch already pending");
            }
        }
        Ok(outcome)
    }

    async fn roll_offers(&self, user: UserId) -> Result<Vec<Asset>, InventoryError> {
        let species_ids: Vec<SpeciesId> = {
            let mut rng = rand::thread_rng();
            (0..self.policy.offers_per_grant)
                .map(|_| self.policy.roll_species(&mut rng))
                .collect()
        };

        let mut offers = Vec::with_capacity(species_ids.len());
        for species_id in species_ids {
            let species = self
                .store
                .get_species(species_id)
                .await?
                .ok_or_else(|| InventoryError::NotFound(format!("species {}", species_id)))?;
            let offer = {
                let mut rng = rand::thread_rng();
                let form_index = self.policy.roll_form(&mut rng, species.forms.len());
                let rarity = self.policy.roll_rarity(&mut rng);
                Asset::pending(user, species_id, form_index, rarity)
            };
            offers.push(offer);
        }
        Ok(offers)
    }
}
