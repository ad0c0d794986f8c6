//! Storage contract required by the repository.
//!
//! The core never implements this trait itself. A `Storage` value is a unit
//! of work: `append_event` and `replace_snapshot` only stage writes, and
//! `commit` applies everything staged since the previous commit atomically.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::state::EntityState;

/// Persistence backend for one aggregate type.
#[async_trait]
pub trait Storage<S, E>: Send + Sync
where
    S: EntityState,
    E: DomainEvent,
{
    /// Highest recorded sequence number for the aggregate, 0 if it has no
    /// events.
    async fn get_max_version(&self, aggregate_id: &S::Id) -> Result<i64, DomainError>;

    /// Stage one event for the aggregate.
    async fn append_event(&self, aggregate_id: &S::Id, event: &E) -> Result<(), DomainError>;

    /// Stage the latest materialized state of the aggregate. The backend
    /// decides whether to overwrite or keep older snapshots.
    async fn replace_snapshot(
        &self,
        aggregate_id: &S::Id,
        latest_snapshot_version: i64,
        state: &S,
    ) -> Result<(), DomainError>;

    /// Durably apply every write staged since the last commit.
    async fn commit(&self) -> Result<(), DomainError>;

    /// Latest stored snapshot, if any.
    async fn get_snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError>;

    /// Events recorded after `since.latest_snapshot_version()`, in any order.
    async fn get_events(&self, aggregate_id: &S::Id, since: &S) -> Result<Vec<E>, DomainError>;

    /// Events created at or before `cutoff`, in any order.
    ///
    /// The default implementation loads the whole history and filters it in
    /// memory; backends with an index on creation time should override it.
    async fn get_events_before(
        &self,
        aggregate_id: &S::Id,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<E>, DomainError> {
        let fresh = S::new(aggregate_id.clone());
        let events = self.get_events(aggregate_id, &fresh).await?;
        Ok(events
            .into_iter()
            .filter(|event| event.created_at() <= cutoff)
            .collect())
    }
}

#[async_trait]
impl<S, E, T> Storage<S, E> for Arc<T>
where
    S: EntityState,
    E: DomainEvent,
    T: Storage<S, E> + ?Sized,
{
    async fn get_max_version(&self, aggregate_id: &S::Id) -> Result<i64, DomainError> {
        (**self).get_max_version(aggregate_id).await
    }

    async fn append_event(&self, aggregate_id: &S::Id, event: &E) -> Result<(), DomainError> {
        (**self).append_event(aggregate_id, event).await
    }

    async fn replace_snapshot(
        &self,
        aggregate_id: &S::Id,
        latest_snapshot_version: i64,
        state: &S,
    ) -> Result<(), DomainError> {
        (**self)
            .replace_snapshot(aggregate_id, latest_snapshot_version, state)
            .await
    }

    async fn commit(&self) -> Result<(), DomainError> {
        (**self).commit().await
    }

    async fn get_snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        (**self).get_snapshot(aggregate_id).await
    }

    async fn get_events(&self, aggregate_id: &S::Id, since: &S) -> Result<Vec<E>, DomainError> {
        (**self).get_events(aggregate_id, since).await
    }

    async fn get_events_before(
        &self,
        aggregate_id: &S::Id,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<E>, DomainError> {
        (**self).get_events_before(aggregate_id, cutoff).await
    }
}

#[async_trait]
impl<S, E, T> Storage<S, E> for Box<T>
where
    S: EntityState,
    E: DomainEvent,
    T: Storage<S, E> + ?Sized,
{
    async fn get_max_version(&self, aggregate_id: &S::Id) -> Result<i64, DomainError> {
        (**self).get_max_version(aggregate_id).await
    }

    async fn append_event(&self, aggregate_id: &S::Id, event: &E) -> Result<(), DomainError> {
        (**self).append_event(aggregate_id, event).await
    }

    async fn replace_snapshot(
        &self,
        aggregate_id: &S::Id,
        latest_snapshot_version: i64,
        state: &S,
    ) -> Result<(), DomainError> {
        (**self)
            .replace_snapshot(aggregate_id, latest_snapshot_version, state)
            .await
    }

    async fn commit(&self) -> Result<(), DomainError> {
        (**self).commit().await
    }

    async fn get_snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        (**self).get_snapshot(aggregate_id).await
    }

    async fn get_events(&self, aggregate_id: &S::Id, since: &S) -> Result<Vec<E>, DomainError> {
        (**self).get_events(aggregate_id, since).await
    }

    async fn get_events_before(
        &self,
        aggregate_id: &S::Id,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<E>, DomainError> {
        (**self).get_events_before(aggregate_id, cutoff).await
    }
}

/// Read-side enumeration of the stored snapshots of one aggregate type.
///
/// Kept apart from `Storage` because it serves queries only and takes no
/// part in the unit of work.
#[async_trait]
pub trait SnapshotListing<S>: Send + Sync
where
    S: EntityState,
{
    /// Every committed snapshot, in no particular order.
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError>;
}

#[async_trait]
impl<S, T> SnapshotListing<S> for Arc<T>
where
    S: EntityState,
    T: SnapshotListing<S> + ?Sized,
{
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError> {
        (**self).list_snapshots().await
    }
}

#[async_trait]
impl<S, T> SnapshotListing<S> for Box<T>
where
    S: EntityState,
    T: SnapshotListing<S> + ?Sized,
{
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError> {
        (**self).list_snapshots().await
    }
}
