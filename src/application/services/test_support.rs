//! Fixtures shared by the service tests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::application::ports::outbound::{GrantSchedulerPort, InventoryStorePort};
use crate::domain::entities::{Asset, Form, Species, Sprites, User};
use crate::domain::value_objects::{GrantPolicy, Rarity, SpeciesId, UserId};
use crate::infrastructure::persistence::InMemoryInventoryStore;

pub const STARTERS: [(u32, &str); 3] = [(1, "bulbasaur"), (4, "charmander"), (7, "squirtle")];

/// Scheduler double that records every call
#[derive(Default)]
pub struct RecordingScheduler {
    pub armed: Mutex<Vec<(UserId, DateTime<Utc>)>>,
    pub cancelled: Mutex<Vec<UserId>>,
}

#[async_trait]
impl GrantSchedulerPort for RecordingScheduler {
    async fn arm(&self, user: UserId, due: DateTime<Utc>) {
        self.armed.lock().await.push((user, due));
    }

    async fn cancel(&self, user: UserId) {
        self.cancelled.lock().await.push(user);
    }
}

pub fn small_policy() -> GrantPolicy {
    GrantPolicy {
        max_species_id: 7,
        ..GrantPolicy::default()
    }
}

/// In-memory store with species 1..=7 in the catalog
pub async fn seeded_store() -> Arc<InMemoryInventoryStore> {
    let store = Arc::new(InMemoryInventoryStore::new());
    for id in 1..=7u32 {
        let name = STARTERS
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("species-{id}"));
        let species = Species::new(SpeciesId::new(id), name.clone())
            .with_form(Form::new(name.clone()).with_sprites(Sprites {
                front_default: format!("{name}.png"),
                front_shiny: format!("{name}-shiny.png"),
                ..Sprites::default()
            }))
            .with_form(Form::new(format!("{name}-alt")));
        store.save_species(&species).await.unwrap();
    }
    store
}

pub async fn add_user(store: &dyn InventoryStorePort, name: &str) -> UserId {
    store.upsert_user(&User::new(name, name)).await.unwrap().id
}

/// Give `user` exactly the listed species as their pending batch
pub async fn give_offers(
    store: &dyn InventoryStorePort,
    user: UserId,
    species: &[u32],
) -> Vec<Asset> {
    let offers: Vec<Asset> = species
        .iter()
        .map(|id| Asset::pending(user, SpeciesId::new(*id), 0, Rarity::Standard))
        .collect();
    store.insert_offers_if_clear(user, &offers).await.unwrap();
    offers
}

/// Give `user` an owned asset of the given species
pub async fn give_owned(store: &dyn InventoryStorePort, user: UserId, species: u32) -> Asset {
    let offers = give_offers(store, user, &[species]).await;
    store
        .claim_offer(user, offers[0].id, Utc::now())
        .await
        .unwrap()
}
