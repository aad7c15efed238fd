//! Pokeroll Engine - Runs the grant scheduler over the configured store

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pokeroll_engine::infrastructure::config::AppConfig;
use pokeroll_engine::infrastructure::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pokeroll_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pokeroll Engine");

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Store backend: {}", config.store.backend);
    if config.store.backend == "sqlite" {
        tracing::info!("  SQLite path: {}", config.store.sqlite_path);
    }

    // Initialize application state
    let state = Arc::new(AppState::new(config).await?);
    tracing::info!("Application state initialized");

    // Every stored user resumes from their persisted next_grant_at
    state.scheduler.arm_all().await?;

    let scheduler_worker = {
        let scheduler = state.scheduler.clone();
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler_worker.abort();

    Ok(())
}
