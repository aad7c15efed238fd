//! Asset entity - A single collectible instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Form;
use crate::domain::value_objects::{AssetId, Rarity, SpeciesId, UserId};

/// Where an asset instance currently lives.
///
/// An asset is a catalog template, an offer pending for exactly one user, or
/// owned by exactly one user. Never more than one of these at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "userId", rename_all = "snake_case")]
pub enum AssetState {
    Catalog,
    Pending(UserId),
    Owned(UserId),
}

impl AssetState {
    /// The user the asset is tied to, if any
    pub fn holder(&self) -> Option<UserId> {
        match self {
            AssetState::Catalog => None,
            AssetState::Pending(user) | AssetState::Owned(user) => Some(*user),
        }
    }

    pub fn is_pending_for(&self, user: UserId) -> bool {
        matches!(self, AssetState::Pending(u) if *u == user)
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        matches!(self, AssetState::Owned(u) if *u == user)
    }

    /// Storage tag of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Catalog => "catalog",
            AssetState::Pending(_) => "pending",
            AssetState::Owned(_) => "owned",
        }
    }
}

/// Illegal transitions between asset states
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetStateError {
    #[error("Asset {asset} is not pending for user {user}")]
    NotPendingFor { asset: AssetId, user: UserId },
    #[error("Asset {asset} is not owned by user {user}")]
    NotOwnedBy { asset: AssetId, user: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub species_id: SpeciesId,
    pub form_index: u32,
    pub rarity: Rarity,
    #[serde(flatten)]
    pub state: AssetState,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// A fresh offer for `user`
    pub fn pending(user: UserId, species_id: SpeciesId, form_index: u32, rarity: Rarity) -> Self {
        Self {
            id: AssetId::new(),
            species_id,
            form_index,
            rarity,
            state: AssetState::Pending(user),
            created_at: Utc::now(),
        }
    }

    /// Pending → Owned for the same user. The id is kept.
    pub fn claim(&mut self, user: UserId) -> Result<(), AssetStateError> {
        if !self.state.is_pending_for(user) {
            return Err(AssetStateError::NotPendingFor {
                asset: self.id,
                user,
            });
        }
        self.state = AssetState::Owned(user);
        Ok(())
    }

    /// Owned(from) → Owned(to), used by trades only.
    pub fn transfer(&mut self, from: UserId, to: UserId) -> Result<(), AssetStateError> {
        if !self.state.is_owned_by(from) {
            return Err(AssetStateError::NotOwnedBy {
                asset: self.id,
                user: from,
            });
        }
        self.state = AssetState::Owned(to);
        Ok(())
    }
}

/// An asset hydrated with the catalog data needed to display it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetail {
    pub asset: Asset,
    pub species_name: String,
    /// `None` when the catalog no longer has the asset's form
    pub form: Option<Form>,
}

impl AssetDetail {
    pub fn sprite_url(&self) -> Option<&str> {
        self.form
            .as_ref()
            .map(|form| form.sprites.front(self.asset.rarity))
    }
}
