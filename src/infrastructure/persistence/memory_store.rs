//! In-memory inventory store
//!
//! Holds the whole inventory behind one `RwLock`; every mutating call takes
//! the write lock once, which makes each call atomic and serializes
//! operations against each other.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::application::ports::outbound::{GrantOutcome, InventoryStorePort, StoreError};
use crate::domain::entities::{
    Asset, AssetDetail, FriendRequest, FriendRequests, Species, TradeProposal, TradeProposals,
    TradeReceipt, User, UserProfile, UserSummary,
};
use crate::domain::value_objects::{
    AssetId, FriendRequestId, SpeciesId, TradeProposalId, UserId,
};

#[derive(Default)]
struct InventoryState {
    users: HashMap<UserId, User>,
    species: HashMap<SpeciesId, Species>,
    assets: HashMap<AssetId, Asset>,
    /// Pending offer ids per user, in slot order
    offer_slots: HashMap<UserId, Vec<AssetId>>,
    /// Directed edges; always inserted and removed in pairs
    friendships: BTreeSet<(UserId, UserId)>,
    friend_requests: HashMap<FriendRequestId, FriendRequest>,
    trade_proposals: HashMap<TradeProposalId, TradeProposal>,
}

impl InventoryState {
    fn detail(&self, asset: &Asset) -> AssetDetail {
        let species = self.species.get(&asset.species_id);
        AssetDetail {
            asset: asset.clone(),
            species_name: species.map(|s| s.name.clone()).unwrap_or_default(),
            form: species.and_then(|s| s.form(asset.form_index)).cloned(),
        }
    }

    fn pending_for(&self, user: UserId) -> Vec<Asset> {
        self.offer_slots
            .get(&user)
            .map(|ids| ids.iter().filter_map(|id| self.assets.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    fn owned_by(&self, user: UserId) -> Vec<Asset> {
        let mut owned: Vec<Asset> = self
            .assets
            .values()
            .filter(|a| a.state.is_owned_by(user))
            .cloned()
            .collect();
        owned.sort_by_key(|a| (a.created_at, a.id));
        owned
    }

    fn friends_of(&self, user: UserId) -> Vec<UserSummary> {
        let mut friends: Vec<UserSummary> = self
            .friendships
            .iter()
            .filter(|(from, _)| *from == user)
            .filter_map(|(_, to)| self.users.get(to).map(User::summary))
            .collect();
        friends.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        friends
    }
}

/// Inventory store kept entirely in process memory
#[derive(Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<InventoryState>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_creation<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl InventoryStorePort for InMemoryInventoryStore {
    async fn upsert_user(&self, user: &User) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .users
            .values()
            .find(|u| u.external_id == user.external_id)
        {
            return Ok(existing.clone());
        }
        state.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.state.read().await.users.keys().copied().collect())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }

        let dropped: Vec<AssetId> = state
            .assets
            .values()
            .filter(|a| a.state.holder() == Some(id))
            .map(|a| a.id)
            .collect();
        for asset in &dropped {
            state.assets.remove(asset);
        }
        state.offer_slots.remove(&id);
        state.friendships.retain(|(a, b)| *a != id && *b != id);
        state.friend_requests.retain(|_, r| !r.is_party(id));
        state
            .trade_proposals
            .retain(|_, p| !p.is_party(id) && !dropped.iter().any(|a| p.references(*a)));
        Ok(true)
    }

    async fn set_preferred_form(
        &self,
        user: UserId,
        species: SpeciesId,
        form_index: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user)))?;
        user.preferred_forms.insert(species, form_index);
        Ok(())
    }

    async fn load_profile(&self, id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let state = self.state.read().await;
        let Some(user) = state.users.get(&id) else {
            return Ok(None);
        };
        Ok(Some(UserProfile {
            user: user.clone(),
            owned: state.owned_by(id).iter().map(|a| state.detail(a)).collect(),
            pending: state.pending_for(id).iter().map(|a| state.detail(a)).collect(),
            friends: state.friends_of(id),
        }))
    }

    async fn save_species(&self, species: &Species) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .species
            .insert(species.id, species.clone());
        Ok(())
    }

    async fn get_species(&self, id: SpeciesId) -> Result<Option<Species>, StoreError> {
        Ok(self.state.read().await.species.get(&id).cloned())
    }

    async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.state.read().await.assets.get(&id).cloned())
    }

    async fn pending_offers(&self, user: UserId) -> Result<Vec<Asset>, StoreError> {
        Ok(self.state.read().await.pending_for(user))
    }

    async fn insert_offers_if_clear(
        &self,
        user: UserId,
        offers: &[Asset],
    ) -> Result<GrantOutcome, StoreError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user) {
            return Err(StoreError::NotFound(format!("user {}", user)));
        }
        if state.offer_slots.get(&user).is_some_and(|slots| !slots.is_empty()) {
            return Ok(GrantOutcome::AlreadyPending);
        }
        if let Some(stray) = offers.iter().find(|a| !a.state.is_pending_for(user)) {
            return Err(StoreError::Conflict(format!(
                "asset {} is not an offer for user {}",
                stray.id, user
            )));
        }

        let slots = offers.iter().map(|a| a.id).collect();
        for offer in offers {
            state.assets.insert(offer.id, offer.clone());
        }
        state.offer_slots.insert(user, slots);
        Ok(GrantOutcome::Granted(offers.to_vec()))
    }

    async fn claim_offer(
        &self,
        user: UserId,
        offer: AssetId,
        next_grant_at: DateTime<Utc>,
    ) -> Result<Asset, StoreError> {
        let mut state = self.state.write().await;
        let still_pending = state
            .offer_slots
            .get(&user)
            .is_some_and(|slots| slots.contains(&offer));
        if !still_pending {
            return Err(StoreError::Conflict(format!(
                "offer {} is no longer pending for user {}",
                offer, user
            )));
        }

        let discarded: Vec<AssetId> = state
            .offer_slots
            .remove(&user)
            .unwrap_or_default()
            .into_iter()
            .filter(|id| *id != offer)
            .collect();
        for id in &discarded {
            state.assets.remove(id);
        }
        state
            .trade_proposals
            .retain(|_, p| !discarded.iter().any(|a| p.references(*a)));

        let claimed = {
            let asset = state
                .assets
                .get_mut(&offer)
                .ok_or_else(|| StoreError::NotFound(format!("asset {}", offer)))?;
            asset
                .claim(user)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
            asset.clone()
        };

        if let Some(u) = state.users.get_mut(&user) {
            u.next_grant_at = next_grant_at;
        }
        Ok(claimed)
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError> {
        Ok(self.state.read().await.friendships.contains(&(a, b)))
    }

    async fn list_friends(&self, user: UserId) -> Result<Vec<UserSummary>, StoreError> {
        Ok(self.state.read().await.friends_of(user))
    }

    async fn remove_friendship(&self, a: UserId, b: UserId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.friendships.remove(&(a, b));
        state.friendships.remove(&(b, a));
        Ok(())
    }

    async fn create_friend_request(&self, request: &FriendRequest) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for party in [request.requester, request.target] {
            if !state.users.contains_key(&party) {
                return Err(StoreError::NotFound(format!("user {}", party)));
            }
        }
        let duplicate = state
            .friend_requests
            .values()
            .any(|r| r.requester == request.requester && r.target == request.target);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "friend request from {} to {} already pending",
                request.requester, request.target
            )));
        }
        state.friend_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_friend_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<Option<FriendRequest>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .friend_requests
            .values()
            .find(|r| r.requester == requester && r.target == target)
            .cloned())
    }

    async fn get_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequest>, StoreError> {
        Ok(self.state.read().await.friend_requests.get(&id).cloned())
    }

    async fn list_friend_requests(&self, user: UserId) -> Result<FriendRequests, StoreError> {
        let state = self.state.read().await;
        let sent = state
            .friend_requests
            .values()
            .filter(|r| r.requester == user)
            .cloned()
            .collect();
        let received = state
            .friend_requests
            .values()
            .filter(|r| r.target == user)
            .cloned()
            .collect();
        Ok(FriendRequests {
            sent: sorted_by_creation(sent, |r: &FriendRequest| r.created_at),
            received: sorted_by_creation(received, |r: &FriendRequest| r.created_at),
        })
    }

    async fn accept_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<FriendRequest, StoreError> {
        let mut state = self.state.write().await;
        let request = state
            .friend_requests
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("friend request {}", id)))?;

        state.friendships.insert((request.requester, request.target));
        state.friendships.insert((request.target, request.requester));
        state
            .friend_requests
            .retain(|_, r| !(r.requester == request.target && r.target == request.requester));
        Ok(request)
    }

    async fn delete_friend_request(&self, id: FriendRequestId) -> Result<bool, StoreError> {
        Ok(self.state.write().await.friend_requests.remove(&id).is_some())
    }

    async fn create_trade_proposal(&self, proposal: &TradeProposal) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for asset in [proposal.proposer_asset, proposal.counterpart_asset] {
            if !state.assets.contains_key(&asset) {
                return Err(StoreError::NotFound(format!("asset {}", asset)));
            }
        }
        if state.trade_proposals.values().any(|p| p.same_terms(proposal)) {
            return Err(StoreError::Conflict(
                "an identical trade proposal is already pending".to_string(),
            ));
        }
        state.trade_proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn find_trade_proposal(
        &self,
        terms: &TradeProposal,
    ) -> Result<Option<TradeProposal>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .trade_proposals
            .values()
            .find(|p| p.same_terms(terms))
            .cloned())
    }

    async fn get_trade_proposal(
        &self,
        id: TradeProposalId,
    ) -> Result<Option<TradeProposal>, StoreError> {
        Ok(self.state.read().await.trade_proposals.get(&id).cloned())
    }

    async fn list_trade_proposals(&self, user: UserId) -> Result<TradeProposals, StoreError> {
        let state = self.state.read().await;
        let sent = state
            .trade_proposals
            .values()
            .filter(|p| p.proposer == user)
            .cloned()
            .collect();
        let received = state
            .trade_proposals
            .values()
            .filter(|p| p.counterpart == user)
            .cloned()
            .collect();
        Ok(TradeProposals {
            sent: sorted_by_creation(sent, |p: &TradeProposal| p.created_at),
            received: sorted_by_creation(received, |p: &TradeProposal| p.created_at),
        })
    }

    async fn execute_trade(&self, id: TradeProposalId) -> Result<TradeReceipt, StoreError> {
        let mut state = self.state.write().await;
        let proposal = state
            .trade_proposals
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("trade proposal {}", id)))?;

        // Validate both legs before touching anything
        let mut given = state
            .assets
            .get(&proposal.proposer_asset)
            .cloned()
            .ok_or_else(|| {
                StoreError::Conflict(format!("asset {} no longer exists", proposal.proposer_asset))
            })?;
        let mut received = state
            .assets
            .get(&proposal.counterpart_asset)
            .cloned()
            .ok_or_else(|| {
                StoreError::Conflict(format!(
                    "asset {} no longer exists",
                    proposal.counterpart_asset
                ))
            })?;
        if given.id == received.id {
            return Err(StoreError::Conflict(
                "a trade needs two distinct assets".to_string(),
            ));
        }
        given
            .transfer(proposal.proposer, proposal.counterpart)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        received
            .transfer(proposal.counterpart, proposal.proposer)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        state.assets.insert(given.id, given);
        state.assets.insert(received.id, received);
        state.trade_proposals.remove(&id);

        let mut invalidated: Vec<TradeProposalId> = state
            .trade_proposals
            .values()
            .filter(|p| {
                p.references(proposal.proposer_asset) || p.references(proposal.counterpart_asset)
            })
            .map(|p| p.id)
            .collect();
        invalidated.sort();
        for stale in &invalidated {
            state.trade_proposals.remove(stale);
        }

        Ok(TradeReceipt {
            proposal,
            invalidated,
        })
    }

    async fn delete_trade_proposal(&self, id: TradeProposalId) -> Result<bool, StoreError> {
        Ok(self.state.write().await.trade_proposals.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Form;
    use crate::domain::value_objects::Rarity;

    async fn store_with_user() -> (InMemoryInventoryStore, UserId) {
        let store = InMemoryInventoryStore::new();
        store
            .save_species(
                &Species::new(SpeciesId::new(1), "bulbasaur").with_form(Form::new("bulbasaur")),
            )
            .await
            .unwrap();
        let user = store.upsert_user(&User::new("ext-1", "Ash")).await.unwrap();
        (store, user.id)
    }

    fn offers(user: UserId, n: usize) -> Vec<Asset> {
        (0..n)
            .map(|_| Asset::pending(user, SpeciesId::new(1), 0, Rarity::Standard))
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_on_external_id() {
        let (store, user) = store_with_user().await;
        let again = store.upsert_user(&User::new("ext-1", "Someone")).await.unwrap();
        assert_eq!(again.id, user);
        assert_eq!(again.display_name, "Ash");
        assert_eq!(store.list_user_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_batch_is_refused_while_one_is_pending() {
        let (store, user) = store_with_user().await;
        let first = store.insert_offers_if_clear(user, &offers(user, 3)).await.unwrap();
        assert!(matches!(first, GrantOutcome::Granted(ref batch) if batch.len() == 3));

        let second = store.insert_offers_if_clear(user, &offers(user, 3)).await.unwrap();
        assert_eq!(second, GrantOutcome::AlreadyPending);
        assert_eq!(store.pending_offers(user).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_claim_twice_conflicts() {
        let (store, user) = store_with_user().await;
        let batch = offers(user, 2);
        store.insert_offers_if_clear(user, &batch).await.unwrap();

        let due = Utc::now();
        store.claim_offer(user, batch[0].id, due).await.unwrap();
        let err = store.claim_offer(user, batch[1].id, due).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_asset(batch[1].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_purges_proposals_on_discarded_offers() {
        let (store, user) = store_with_user().await;
        let other = store.upsert_user(&User::new("ext-2", "Misty")).await.unwrap();
        let traded = offers(other.id, 1);
        store.insert_offers_if_clear(other.id, &traded).await.unwrap();
        store.claim_offer(other.id, traded[0].id, Utc::now()).await.unwrap();

        let batch = offers(user, 2);
        store.insert_offers_if_clear(user, &batch).await.unwrap();
        let on_discarded = TradeProposal::new(other.id, traded[0].id, user, batch[1].id);
        let on_claimed = TradeProposal::new(other.id, traded[0].id, user, batch[0].id);
        store.create_trade_proposal(&on_discarded).await.unwrap();
        store.create_trade_proposal(&on_claimed).await.unwrap();

        store.claim_offer(user, batch[0].id, Utc::now()).await.unwrap();

        assert!(store.get_trade_proposal(on_discarded.id).await.unwrap().is_none());
        assert!(store.get_trade_proposal(on_claimed.id).await.unwrap().is_some());
        let listed = store.list_trade_proposals(user).await.unwrap();
        assert_eq!(listed.received.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let (store, user) = store_with_user().await;
        store.insert_offers_if_clear(user, &offers(user, 3)).await.unwrap();
        let other = store.upsert_user(&User::new("ext-2", "Misty")).await.unwrap();
        store
            .create_friend_request(&FriendRequest::new(other.id, user))
            .await
            .unwrap();

        assert!(store.delete_user(user).await.unwrap());
        assert!(store.pending_offers(user).await.unwrap().is_empty());
        assert!(store
            .list_friend_requests(other.id)
            .await
            .unwrap()
            .sent
            .is_empty());
        assert!(!store.delete_user(user).await.unwrap());
    }
}
