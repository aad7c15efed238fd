//! Outbound ports - Interfaces that the application requires from external systems

mod inventory_port;
mod scheduler_port;

pub use inventory_port::{GrantOutcome, InventoryStorePort, StoreError};
pub use scheduler_port::GrantSchedulerPort;
