//! Profile Service - Player registration, profiles and preferences

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::ports::inbound::InventoryError;
use crate::application::ports::outbound::{GrantSchedulerPort, InventoryStorePort};
use crate::domain::entities::{User, UserProfile};
use crate::domain::value_objects::{SpeciesId, UserId};

pub struct ProfileService {
    store: Arc<dyn InventoryStorePort>,
    scheduler: Arc<dyn GrantSchedulerPort>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn InventoryStorePort>, scheduler: Arc<dyn GrantSchedulerPort>) -> Self {
        Self { store, scheduler }
    }

    /// Register the player behind an identity-provider key.
    ///
    /// Calling this again with the same key returns the existing user
    /// unchanged. Either way the user is armed at their stored
    /// `next_grant_at`, so a new player gets a batch right away.
    #[instrument(skip(self))]
    pub async fn register(
        &self,
        external_id: &str,
        display_name: &str,
    ) -> Result<User, InventoryError> {
        let user = self
            .store
            .upsert_user(&User::new(external_id, display_name))
            .await?;
        self.scheduler.arm(user.id, user.next_grant_at).await;
        info!(user_id = %user.id, external_id, "Registered user");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, user: UserId) -> Result<UserProfile, InventoryError> {
        self.store
            .load_profile(user)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("user {}", user)))
    }

    /// Record which form of `species` the player wants to see
    #[instrument(skip(self))]
    pub async fn set_preferred_form(
        &self,
        user: UserId,
        species: SpeciesId,
        form_index: u32,
    ) -> Result<(), InventoryError> {
        let entry = self
            .store
            .get_species(species)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("species {}", species)))?;
        if entry.form(form_index).is_none() {
            return Err(InventoryError::OutOfRange {
                index: form_index as usize,
                len: entry.forms.len(),
            });
        }
        self.store.set_preferred_form(user, species, form_index).await?;
        debug!(%user, %species, form_index, "Preferred form updated");
        Ok(())
    }

    /// Delete the player and everything they hold, and stop their grants
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user: UserId) -> Result<(), InventoryError> {
        if !self.store.delete_user(user).await? {
            return Err(InventoryError::NotFound(format!("user {}", user)));
        }
        self.scheduler.cancel(user).await;
        info!(%user, "Deleted user");
        Ok(())
    }
}
