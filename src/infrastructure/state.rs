//! Shared application state

use std::sync::Arc;

use anyhow::Result;

use crate::application::ports::outbound::{GrantSchedulerPort, InventoryStorePort};
use crate::application::services::{
    ClaimService, FriendshipService, GrantService, ProfileService, TradeService,
};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::grant_scheduler::GrantScheduler;
use crate::infrastructure::persistence::StoreFactory;

/// Shared application state
///
/// The request layer holds this and calls the services with an already
/// resolved acting user.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn InventoryStorePort>,
    pub scheduler: Arc<GrantScheduler>,
    // Application services
    pub grant_service: Arc<GrantService>,
    pub claim_service: ClaimService,
    pub friendship_service: FriendshipService,
    pub trade_service: TradeService,
    pub profile_service: ProfileService,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = StoreFactory::create(&config.store).await?;
        Ok(Self::with_store(config, store))
    }

    /// Wire the services around an existing store
    pub fn with_store(config: AppConfig, store: Arc<dyn InventoryStorePort>) -> Self {
        let policy = config.grant_policy();
        tracing::info!(
            interval_minutes = policy.interval.num_minutes(),
            offers_per_grant = policy.offers_per_grant,
            shiny_probability = policy.shiny_probability(),
            "Grant policy loaded"
        );

        let grant_service = Arc::new(GrantService::new(store.clone(), policy.clone()));
        let scheduler = Arc::new(GrantScheduler::new(
            grant_service.clone(),
            store.clone(),
            config.grant_retry_delay(),
        ));
        let scheduler_port: Arc<dyn GrantSchedulerPort> = scheduler.clone();

        let claim_service = ClaimService::new(store.clone(), scheduler_port.clone(), policy);
        let friendship_service = FriendshipService::new(store.clone());
        let trade_service = TradeService::new(store.clone());
        let profile_service = ProfileService::new(store.clone(), scheduler_port);

        Self {
            config,
            store,
            scheduler,
            grant_service,
            claim_service,
            friendship_service,
            trade_service,
            profile_service,
        }
    }
}
