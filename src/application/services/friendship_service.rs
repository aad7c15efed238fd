//! Friendship Service - Friend requests and the symmetric friend relation

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::ports::inbound::InventoryError;
use crate::application::ports::outbound::{InventoryStorePort, StoreError};
use crate::domain::entities::{FriendRequest, FriendRequests, UserSummary};
use crate::domain::value_objects::{FriendRequestId, UserId};

pub struct FriendshipService {
    store: Arc<dyn InventoryStorePort>,
}

impl FriendshipService {
    pub fn new(store: Arc<dyn InventoryStorePort>) -> Self {
        Self { store }
    }

    /// Send a friend request from `requester` to `target`.
    ///
    /// Only a pending request in the same direction counts as a duplicate;
    /// a request in the opposite direction is left alone.
    #[instrument(skip(self))]
    pub async fn propose(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<FriendRequest, InventoryError> {
        if requester == target {
            return Err(InventoryError::SelfReference);
        }
        if self.store.get_user(target).await?.is_none() {
            return Err(InventoryError::NotFound(format!("user {}", target)));
        }
        if self.store.are_friends(requester, target).await? {
            return Err(InventoryError::Conflict(
                "users are already friends".to_string(),
            ));
        }
        if self.store.find_friend_request(requester, target).await?.is_some() {
            return Err(InventoryError::Conflict(
                "friend request already pending".to_string(),
            ));
        }

        let request = FriendRequest::new(requester, target);
        self.store.create_friend_request(&request).await?;
        info!(request_id = %request.id, %requester, %target, "Created friend request");
        Ok(request)
    }

    /// Accept a request. Only its target may accept it.
    #[instrument(skip(self))]
    pub async fn accept(
        &self,
        request_id: FriendRequestId,
        acting_user: UserId,
    ) -> Result<FriendRequest, InventoryError> {
        let request = self.load(request_id).await?;
        if request.target != acting_user {
            return Err(InventoryError::Unauthorized);
        }

        let request = self
            .store
            .accept_friend_request(request_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    InventoryError::NotFound(format!("friend request {}", request_id))
                }
                other => other.into(),
            })?;
        info!(
            requester = %request.requester,
            target = %request.target,
            "Friend request accepted"
        );
        Ok(request)
    }

    /// Decline a received request
    #[instrument(skip(self))]
    pub async fn decline(
        &self,
        request_id: FriendRequestId,
        acting_user: UserId,
    ) -> Result<(), InventoryError> {
        self.withdraw(request_id, acting_user).await
    }

    /// Cancel a sent request
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        request_id: FriendRequestId,
        acting_user: UserId,
    ) -> Result<(), InventoryError> {
        self.withdraw(request_id, acting_user).await
    }

    /// Remove the friendship between two users. Succeeds if there was none.
    #[instrument(skip(self))]
    pub async fn remove_friendship(
        &self,
        user: UserId,
        friend: UserId,
    ) -> Result<(), InventoryError> {
        self.store.remove_friendship(user, friend).await?;
        debug!(%user, %friend, "Removed friendship");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_friends(&self, user: UserId) -> Result<Vec<UserSummary>, InventoryError> {
        Ok(self.store.list_friends(user).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_requests(&self, user: UserId) -> Result<FriendRequests, InventoryError> {
        Ok(self.store.list_friend_requests(user).await?)
    }

    async fn load(&self, request_id: FriendRequestId) -> Result<FriendRequest, InventoryError> {
        self.store
            .get_friend_request(request_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("friend request {}", request_id)))
    }

    async fn withdraw(
        &self,
        request_id: FriendRequestId,
        acting_user: UserId,
    ) -> Result<(), InventoryError> {
        let request = self.load(request_id).await?;
        if !request.is_party(acting_user) {
            return Err(InventoryError::Unauthorized);
        }
        self.store.delete_friend_request(request_id).await?;
        debug!(%request_id, %acting_user, "Friend request withdrawn");
        Ok(())
    }
}
