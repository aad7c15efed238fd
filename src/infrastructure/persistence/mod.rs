//! Inventory store adapters
//!
//! Two implementations of `InventoryStorePort`: SQLite for durable
//! deployments and an in-memory store for tests and throwaway runs.

mod factory;
mod memory_store;
mod sqlite_store;

pub use factory::StoreFactory;
pub use memory_store::InMemoryInventoryStore;
pub use sqlite_store::SqliteInventoryStore;
