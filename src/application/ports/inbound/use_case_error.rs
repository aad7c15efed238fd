//! Errors returned to the request-handling layer

use crate::application::ports::outbound::StoreError;

/// Coarse error class the caller maps to a transport response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Authorization,
    Persistence,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("A user cannot target themselves")]
    SelfReference,

    #[error("Index {index} is out of range (have {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("No pending offers")]
    NoPendingOffers,

    #[error("Offer batch was already claimed")]
    AlreadyClaimed,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Users must be friends to trade")]
    NotFriends,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Acting user is not a party to this proposal")]
    Unauthorized,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl InventoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::SelfReference
            | InventoryError::OutOfRange { .. }
            | InventoryError::NotFriends => ErrorKind::Validation,
            InventoryError::NoPendingOffers
            | InventoryError::AlreadyClaimed
            | InventoryError::Conflict(_) => ErrorKind::Conflict,
            InventoryError::NotFound(_) => ErrorKind::NotFound,
            InventoryError::Unauthorized => ErrorKind::Authorization,
            InventoryError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => InventoryError::NotFound(what),
            StoreError::Conflict(what) => InventoryError::Conflict(what),
            StoreError::Database(_) | StoreError::Serialization(_) => {
                InventoryError::Persistence(err.to_string())
            }
        }
    }
}
