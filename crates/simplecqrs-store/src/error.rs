//! Backend error types.

use simplecqrs_core::error::DomainError;
use thiserror::Error;

/// Failures raised inside a storage backend before they are surfaced to the
/// repository as `DomainError::Infrastructure`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying the bundled migrations failed.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another thread panicked while holding a store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        DomainError::Infrastructure(err.to_string())
    }
}
