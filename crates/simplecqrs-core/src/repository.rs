//! Repository mediating between aggregates and a storage backend.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::state::EntityState;
use crate::storage::Storage;

type IdOf<A> = <<A as AggregateRoot>::State as EntityState>::Id;

/// Loads aggregates from snapshots plus event replay, and saves their pending
/// events under an optimistic-concurrency check.
///
/// The repository holds no per-aggregate state. Operations on different ids
/// may run concurrently; operations on the same id must be sequenced by the
/// caller or one of them will fail with `DomainError::ConcurrencyConflict`.
#[derive(Debug)]
pub struct Repository<A, St> {
    storage: St,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A, St> Repository<A, St>
where
    A: AggregateRoot,
    St: Storage<A::State, A::Event>,
{
    /// Creates a repository over the given storage unit of work.
    #[must_use]
    pub fn new(storage: St) -> Self {
        Self {
            storage,
            _aggregate: PhantomData,
        }
    }

    /// Returns the underlying storage.
    #[must_use]
    pub fn storage(&self) -> &St {
        &self.storage
    }

    /// Loads an aggregate from its latest snapshot plus the events recorded
    /// after it. A non-existent aggregate comes back at version 0.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the storage backend.
    pub async fn load(&self, aggregate_id: &IdOf<A>) -> Result<A, DomainError> {
        self.load_with(aggregate_id, false).await
    }

    /// Like [`Repository::load`], optionally ignoring the stored snapshot and
    /// replaying the full history from version 0.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the storage backend.
    #[instrument(
        skip(self),
        fields(aggregate_type = <A::State as EntityState>::AGGREGATE_TYPE)
    )]
    pub async fn load_with(
        &self,
        aggregate_id: &IdOf<A>,
        skip_snapshot: bool,
    ) -> Result<A, DomainError> {
        let snapshot = if skip_snapshot {
            None
        } else {
            self.storage.get_snapshot(aggregate_id).await?
        };
        let from_snapshot = snapshot.is_some();
        let initial =
            snapshot.unwrap_or_else(|| <A::State as EntityState>::new(aggregate_id.clone()));

        let mut aggregate = A::new(&initial);
        let history = self.storage.get_events(aggregate_id, &initial).await?;
        let fetched = history.len();
        let applied = aggregate.load_from_history(history);

        debug!(
            from_snapshot,
            snapshot_version = initial.version(),
            fetched,
            applied,
            version = aggregate.version(),
            "aggregate loaded"
        );

        Ok(aggregate)
    }

    /// Reconstructs the aggregate as it was at `cutoff`, replaying only events
    /// created at or before that instant. Snapshots are never used.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the storage backend.
    #[instrument(
        skip(self),
        fields(aggregate_type = <A::State as EntityState>::AGGREGATE_TYPE)
    )]
    pub async fn load_as_of(
        &self,
        aggregate_id: &IdOf<A>,
        cutoff: DateTime<Utc>,
    ) -> Result<A, DomainError> {
        let initial = <A::State as EntityState>::new(aggregate_id.clone());
        let mut aggregate = A::new(&initial);

        let history: Vec<A::Event> = self
            .storage
            .get_events_before(aggregate_id, cutoff)
            .await?
            .into_iter()
            .filter(|event| event.created_at() <= cutoff)
            .collect();
        let applied = aggregate.load_from_history(history);

        debug!(
            %cutoff,
            applied,
            version = aggregate.version(),
            "aggregate loaded as of cutoff"
        );

        Ok(aggregate)
    }

    /// Persists the aggregate's pending events, oldest first, followed by its
    /// snapshot, then commits. Returns the persisted events in the order they
    /// were appended.
    ///
    /// Nothing reaches the storage backend when there are no pending events.
    /// The aggregate is spent after a successful save; reload it to continue.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when the backend's current
    /// version differs from `expected_version`; nothing is written in that
    /// case. Backend errors are propagated unchanged, possibly after some
    /// events were already drained from the aggregate.
    #[instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = <A::State as EntityState>::AGGREGATE_TYPE,
            aggregate_id = %aggregate.id(),
        )
    )]
    pub async fn save(
        &self,
        aggregate: &mut A,
        expected_version: i64,
    ) -> Result<Vec<A::Event>, DomainError> {
        if !aggregate.has_pending_changes() {
            debug!("no pending changes, nothing to save");
            return Ok(Vec::new());
        }

        let aggregate_id = aggregate.id().clone();
        let actual = self.storage.get_max_version(&aggregate_id).await?;
        if actual != expected_version {
            warn!(expected_version, actual, "optimistic concurrency check failed");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let mut persisted = Vec::new();
        while let Some(event) = aggregate.take_next_pending_change() {
            self.storage.append_event(&aggregate_id, &event).await?;
            persisted.push(event);
        }

        let snapshot = aggregate.snapshot();
        self.storage
            .replace_snapshot(&aggregate_id, aggregate.version(), &snapshot)
            .await?;
        self.storage.commit().await?;

        info!(
            events = persisted.len(),
            version = aggregate.version(),
            "aggregate saved"
        );

        Ok(persisted)
    }
}
