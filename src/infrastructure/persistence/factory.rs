//! Store factory - Creates the inventory store selected by configuration

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::application::ports::outbound::InventoryStorePort;
use crate::infrastructure::config::StoreConfig;
use crate::infrastructure::persistence::{InMemoryInventoryStore, SqliteInventoryStore};

pub struct StoreFactory;

impl StoreFactory {
    pub async fn create(config: &StoreConfig) -> Result<Arc<dyn InventoryStorePort>> {
        match config.backend.as_str() {
            "memory" => {
                tracing::warn!("Using in-memory inventory store, state is lost on exit");
                Ok(Arc::new(InMemoryInventoryStore::new()))
            }
            "sqlite" => {
                if let Some(parent) = Path::new(&config.sqlite_path).parent() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create SQLite database directory")?;
                }

                let url = format!("sqlite:{}", config.sqlite_path);
                let options = SqliteConnectOptions::from_str(&url)
                    .context("Invalid SQLite database path")?
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5));
                let pool = SqlitePoolOptions::new()
                    .connect_with(options)
                    .await
                    .context("Failed to connect to SQLite inventory database")?;
                tracing::info!("Connected to SQLite inventory database: {}", config.sqlite_path);

                let store = SqliteInventoryStore::new(pool)
                    .await
                    .context("Failed to create inventory schema")?;
                Ok(Arc::new(store))
            }
            other => anyhow::bail!("Unknown store backend: {}", other),
        }
    }
}
