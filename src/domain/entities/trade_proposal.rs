//! Trade proposal entity - Directed offer to swap two owned assets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{AssetId, TradeProposalId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeProposal {
    pub id: TradeProposalId,
    pub proposer: UserId,
    pub proposer_asset: AssetId,
    pub counterpart: UserId,
    pub counterpart_asset: AssetId,
    pub created_at: DateTime<Utc>,
}

impl TradeProposal {
    pub fn new(
        proposer: UserId,
        proposer_asset: AssetId,
        counterpart: UserId,
        counterpart_asset: AssetId,
    ) -> Self {
        Self {
            id: TradeProposalId::new(),
            proposer,
            proposer_asset,
            counterpart,
            counterpart_asset,
            created_at: Utc::now(),
        }
    }

    pub fn is_party(&self, user: UserId) -> bool {
        self.proposer == user || self.counterpart == user
    }

    /// True if the proposal names `asset` on either side
    pub fn references(&self, asset: AssetId) -> bool {
        self.proposer_asset == asset || self.counterpart_asset == asset
    }

    /// Same proposer, counterpart and assets, ignoring id and timestamp
    pub fn same_terms(&self, other: &TradeProposal) -> bool {
        self.proposer == other.proposer
            && self.proposer_asset == other.proposer_asset
            && self.counterpart == other.counterpart
            && self.counterpart_asset == other.counterpart_asset
    }
}

/// Pending trade proposals seen from one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeProposals {
    pub sent: Vec<TradeProposal>,
    pub received: Vec<TradeProposal>,
}

/// Result of an accepted trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReceipt {
    pub proposal: TradeProposal,
    /// Other pending proposals dropped because they named a traded asset.
    /// Accepting one of these afterwards fails with `NotFound`, or with
    /// `Conflict` if the accept was already in flight.
    pub invalidated: Vec<TradeProposalId>,
}
