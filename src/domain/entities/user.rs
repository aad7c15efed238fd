//! User entity - A player and the aggregates hydrated around them

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AssetDetail;
use crate::domain::value_objects::{SpeciesId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Stable key from the identity provider
    pub external_id: String,
    pub display_name: String,
    /// When the next offer batch is due
    pub next_grant_at: DateTime<Utc>,
    /// Form index the player prefers to see for each species
    pub preferred_forms: BTreeMap<SpeciesId, u32>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A new user whose first batch is due immediately
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            external_id: external_id.into(),
            display_name: display_name.into(),
            next_grant_at: now,
            preferred_forms: BTreeMap::new(),
            created_at: now,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            display_name: self.display_name.clone(),
        }
    }
}

/// Minimal user reference used in friend lists and proposals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub display_name: String,
}

/// A user with everything a profile view needs, loaded in one read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user: User,
    /// Owned assets, oldest first
    pub owned: Vec<AssetDetail>,
    /// Pending offers in slot order (the order claim indices refer to)
    pub pending: Vec<AssetDetail>,
    pub friends: Vec<UserSummary>,
}
