//! Domain error types.

use thiserror::Error;

/// Top-level error type shared by aggregates, repositories and storage
/// backends.
///
/// Aggregate identifiers are carried in their display form so the error stays
/// independent of the identity type of any particular aggregate.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A mutation targeted an aggregate that has no recorded events.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// A create targeted an aggregate that already has recorded events.
    #[error("aggregate already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The version the caller observed when it loaded the aggregate.
        expected: i64,
        /// The version currently held by the storage backend.
        actual: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Infrastructure(format!("serialization failed: {err}"))
    }
}
