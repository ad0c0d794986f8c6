//! Materialized aggregate state (snapshot) abstractions.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping fields shared by every aggregate state.
///
/// `version` and `last_modified` only move when the owning aggregate applies
/// an event; their setter is private to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetadata<Id> {
    id: Id,
    version: i64,
    latest_snapshot_version: i64,
    last_modified: Option<DateTime<Utc>>,
}

impl<Id> StateMetadata<Id> {
    /// Metadata for an entity with no history: version 0, never modified.
    #[must_use]
    pub fn new(id: Id) -> Self {
        Self {
            id,
            version: 0,
            latest_snapshot_version: 0,
            last_modified: None,
        }
    }

    /// Rebuilds the metadata of a persisted snapshot.
    #[must_use]
    pub fn restore(
        id: Id,
        version: i64,
        latest_snapshot_version: i64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            version,
            latest_snapshot_version,
            last_modified,
        }
    }

    /// Entity identity.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Sequence number of the last applied event, 0 for a new entity.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Version at which the last persisted snapshot was taken.
    #[must_use]
    pub fn latest_snapshot_version(&self) -> i64 {
        self.latest_snapshot_version
    }

    /// Creation time of the last applied event.
    #[must_use]
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Records the version at which this state was persisted as a snapshot.
    /// Called by storage backends when they store the snapshot.
    pub fn set_latest_snapshot_version(&mut self, version: i64) {
        self.latest_snapshot_version = version;
    }

    pub(crate) fn advance(&mut self, version: i64, last_modified: DateTime<Utc>) {
        self.version = version;
        self.last_modified = Some(last_modified);
    }
}

/// Trait implemented by the materialized state of an aggregate type.
///
/// States are plain values: cloning yields an independent copy, and equality
/// compares every field.
pub trait EntityState: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Identity type of the aggregate.
    type Id: Clone + Debug + Display + Eq + Hash + Send + Sync + 'static;

    /// Stable name of the aggregate type, used by backends to partition
    /// storage between aggregate types.
    const AGGREGATE_TYPE: &'static str;

    /// A fresh, zero-version state for the given identity.
    fn new(id: Self::Id) -> Self;

    /// Returns the bookkeeping fields.
    fn metadata(&self) -> &StateMetadata<Self::Id>;

    /// Mutable access to the bookkeeping fields.
    fn metadata_mut(&mut self) -> &mut StateMetadata<Self::Id>;

    /// Shorthand for `metadata().id()`.
    fn id(&self) -> &Self::Id {
        self.metadata().id()
    }

    /// Shorthand for `metadata().version()`.
    fn version(&self) -> i64 {
        self.metadata().version()
    }

    /// Shorthand for `metadata().latest_snapshot_version()`.
    fn latest_snapshot_version(&self) -> i64 {
        self.metadata().latest_snapshot_version()
    }
}
