//! Inbound ports - Interfaces that the application exposes to the outside world

mod use_case_error;

pub use use_case_error::{ErrorKind, InventoryError};
