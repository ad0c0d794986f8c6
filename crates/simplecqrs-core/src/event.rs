//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every domain event.
///
/// The sequence number is write-once: it starts at 0 ("unassigned") and is
/// set by the aggregate when the event is recorded. Callers constructing a new
/// event have no way to pick it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    event_id: Uuid,
    sequence_number: i64,
    correlation_id: Uuid,
    created_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Metadata for a brand-new, not yet recorded event.
    #[must_use]
    pub fn new(correlation_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            sequence_number: 0,
            correlation_id,
            created_at,
        }
    }

    /// Rebuilds the metadata of an event that was already recorded, e.g. when
    /// a storage backend decodes its history.
    #[must_use]
    pub fn recorded(
        event_id: Uuid,
        sequence_number: i64,
        correlation_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            sequence_number,
            correlation_id,
            created_at,
        }
    }

    /// Unique event identifier.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Position of the event within its aggregate stream, 0 while unassigned.
    #[must_use]
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    /// Correlation ID for tracing a command through its effects.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Timestamp of event creation.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the aggregate has assigned a sequence number yet.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.sequence_number != 0
    }

    /// Sets the sequence number unless one is already assigned. Returns
    /// whether the number was taken.
    pub(crate) fn assign_sequence_number(&mut self, sequence_number: i64) -> bool {
        if self.is_assigned() {
            return false;
        }
        self.sequence_number = sequence_number;
        true
    }
}

/// Trait that all domain events implement.
///
/// Concrete events are expected to be an envelope around a closed enum of
/// payload variants so that `AggregateRoot::apply` can match exhaustively.
pub trait DomainEvent: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Returns the event type name (used for storage routing and logging).
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Mutable access to the metadata, used by the aggregate to assign the
    /// sequence number. The sequence number setter is private to this crate.
    fn metadata_mut(&mut self) -> &mut EventMetadata;

    /// Shorthand for `metadata().sequence_number()`.
    fn sequence_number(&self) -> i64 {
        self.metadata().sequence_number()
    }

    /// Shorthand for `metadata().created_at()`.
    fn created_at(&self) -> DateTime<Utc> {
        self.metadata().created_at()
    }
}
