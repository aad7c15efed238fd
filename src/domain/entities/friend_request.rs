//! Friend request entity - Directed proposal to become friends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{FriendRequestId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: FriendRequestId,
    pub requester: UserId,
    pub target: UserId,
    pub created_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn new(requester: UserId, target: UserId) -> Self {
        Self {
            id: FriendRequestId::new(),
            requester,
            target,
            created_at: Utc::now(),
        }
    }

    pub fn is_party(&self, user: UserId) -> bool {
        self.requester == user || self.target == user
    }
}

/// Pending friend requests seen from one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequests {
    pub sent: Vec<FriendRequest>,
    pub received: Vec<FriendRequest>,
}
