use thiserror::Error;

use crate::types::IdentityId;

/// Failures raised by an identity store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "sqlite")]
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A persisted value could not be parsed back
    #[error("Corrupt identity record: {0}")]
    Corrupt(String),

    /// A row mutex was poisoned by a panicking writer
    #[error("Identity record lock poisoned")]
    Poisoned,

    #[error("An identity with login '{0}' already exists")]
    Duplicate(String),
}

/// Errors surfaced to lease callers.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Pool exhausted for the given criteria; retry with backoff
    #[error("No available identity matches the criteria")]
    NoAvailableIdentity,

    /// Wrong or stale holder token, or the identity is already free
    #[error("Identity '{id}' is not held by the caller")]
    NotHeldByCaller { id: IdentityId },

    #[error("Identity '{id}' not found")]
    NotFound { id: IdentityId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LeaseError {
    /// Machine-readable reason code used on the wire.
    pub fn reason(&self) -> &'static str {
        match self {
            LeaseError::NoAvailableIdentity => "NO_AVAILABLE_IDENTITY",
            LeaseError::NotHeldByCaller { .. } => "NOT_HELD_BY_CALLER",
            LeaseError::NotFound { .. } => "NOT_FOUND",
            LeaseError::Store(StoreError::Duplicate(_)) => "DUPLICATE_LOGIN",
            LeaseError::Store(_) => "STORE_ERROR",
        }
    }
}
