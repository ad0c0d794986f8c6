//! In-process storage backend.
//!
//! `InMemoryStore` owns the committed event streams and snapshots and is
//! cheap to clone. It is written to only through an `InMemoryStorage`
//! obtained from `session()`, which is one unit of work: writes are buffered
//! until `commit`, which validates and applies the whole batch under a
//! single write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use simplecqrs_core::error::DomainError;
use simplecqrs_core::event::DomainEvent;
use simplecqrs_core::state::EntityState;
use simplecqrs_core::storage::{SnapshotListing, Storage};
use tracing::{debug, warn};

use crate::error::StoreError;

#[derive(Debug)]
struct Streams<S: EntityState, E> {
    events: HashMap<S::Id, Vec<E>>,
    snapshots: HashMap<S::Id, S>,
}

impl<S: EntityState, E> Default for Streams<S, E> {
    fn default() -> Self {
        Self {
            events: HashMap::new(),
            snapshots: HashMap::new(),
        }
    }
}

impl<S: EntityState, E: DomainEvent> Streams<S, E> {
    fn max_version(&self, aggregate_id: &S::Id) -> i64 {
        self.events
            .get(aggregate_id)
            .and_then(|stream| stream.last())
            .map_or(0, DomainEvent::sequence_number)
    }

    fn events_after(&self, aggregate_id: &S::Id, version: i64) -> Vec<E> {
        self.events
            .get(aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|event| event.sequence_number() > version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every event must continue its stream at `last + 1`, including events
    /// earlier in the same batch.
    fn check_contiguous(&self, batch: &[(S::Id, E)]) -> Result<(), DomainError> {
        let mut heads: HashMap<&S::Id, i64> = HashMap::new();
        for (aggregate_id, event) in batch {
            let head = heads
                .entry(aggregate_id)
                .or_insert_with(|| self.max_version(aggregate_id));
            if event.sequence_number() != *head + 1 {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: aggregate_id.to_string(),
                    expected: event.sequence_number() - 1,
                    actual: self.max_version(aggregate_id),
                });
            }
            *head = event.sequence_number();
        }
        Ok(())
    }
}

/// Shared, thread-safe event and snapshot store living in process memory.
#[derive(Debug)]
pub struct InMemoryStore<S: EntityState, E> {
    streams: Arc<RwLock<Streams<S, E>>>,
}

impl<S: EntityState, E> Clone for InMemoryStore<S, E> {
    fn clone(&self) -> Self {
        Self {
            streams: Arc::clone(&self.streams),
        }
    }
}

impl<S: EntityState, E> Default for InMemoryStore<S, E> {
    fn default() -> Self {
        Self {
            streams: Arc::new(RwLock::new(Streams::default())),
        }
    }
}

impl<S, E> InMemoryStore<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new unit of work against this store.
    #[must_use]
    pub fn session(&self) -> InMemoryStorage<S, E> {
        InMemoryStorage {
            store: self.clone(),
            staged: Mutex::new(Staged::default()),
        }
    }

    /// All committed events of an aggregate, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store lock is poisoned.
    pub fn events(&self, aggregate_id: &S::Id) -> Result<Vec<E>, DomainError> {
        Ok(self.read()?.events_after(aggregate_id, 0))
    }

    /// The committed snapshot of an aggregate, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store lock is poisoned.
    pub fn snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        Ok(self.read()?.snapshots.get(aggregate_id).cloned())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Streams<S, E>>, StoreError> {
        self.streams.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Streams<S, E>>, StoreError> {
        self.streams.write().map_err(|_| StoreError::Poisoned)
    }
}

fn with_snapshot_version<S: EntityState>(state: &S, latest_snapshot_version: i64) -> S {
    let mut state = state.clone();
    state
        .metadata_mut()
        .set_latest_snapshot_version(latest_snapshot_version);
    state
}

#[async_trait]
impl<S, E> SnapshotListing<S> for InMemoryStore<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError> {
        Ok(self.read()?.snapshots.values().cloned().collect())
    }
}

#[derive(Debug)]
struct Staged<S: EntityState, E> {
    events: Vec<(S::Id, E)>,
    snapshots: Vec<(S::Id, S)>,
}

impl<S: EntityState, E> Default for Staged<S, E> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            snapshots: Vec::new(),
        }
    }
}

impl<S: EntityState, E> Staged<S, E> {
    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.snapshots.is_empty()
    }
}

/// One unit of work against an `InMemoryStore`.
///
/// Reads see committed data only. Writes are buffered until `commit`; a
/// batch that does not continue every stream contiguously is discarded
/// whole and reported as a concurrency conflict.
#[derive(Debug)]
pub struct InMemoryStorage<S: EntityState, E> {
    store: InMemoryStore<S, E>,
    staged: Mutex<Staged<S, E>>,
}

impl<S, E> InMemoryStorage<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    /// Number of buffered event appends awaiting `commit`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the buffer lock is poisoned.
    pub fn staged_event_count(&self) -> Result<usize, DomainError> {
        Ok(self.lock_staged()?.events.len())
    }

    fn lock_staged(&self) -> Result<std::sync::MutexGuard<'_, Staged<S, E>>, StoreError> {
        self.staged.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl<S, E> Storage<S, E> for InMemoryStorage<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    async fn get_max_version(&self, aggregate_id: &S::Id) -> Result<i64, DomainError> {
        Ok(self.store.read()?.max_version(aggregate_id))
    }

    async fn append_event(&self, aggregate_id: &S::Id, event: &E) -> Result<(), DomainError> {
        self.lock_staged()?
            .events
            .push((aggregate_id.clone(), event.clone()));
        Ok(())
    }

    async fn replace_snapshot(
        &self,
        aggregate_id: &S::Id,
        latest_snapshot_version: i64,
        state: &S,
    ) -> Result<(), DomainError> {
        let state = with_snapshot_version(state, latest_snapshot_version);
        self.lock_staged()?
            .snapshots
            .push((aggregate_id.clone(), state));
        Ok(())
    }

    async fn commit(&self) -> Result<(), DomainError> {
        let staged = std::mem::take(&mut *self.lock_staged()?);
        if staged.is_empty() {
            return Ok(());
        }

        let mut streams = self.store.write()?;
        if let Err(err) = streams.check_contiguous(&staged.events) {
            warn!(error = %err, "discarding in-memory batch");
            return Err(err);
        }

        let events = staged.events.len();
        let snapshots = staged.snapshots.len();
        for (aggregate_id, event) in staged.events {
            streams.events.entry(aggregate_id).or_default().push(event);
        }
        for (aggregate_id, state) in staged.snapshots {
            streams.snapshots.insert(aggregate_id, state);
        }

        debug!(events, snapshots, "in-memory batch committed");
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        self.store.snapshot(aggregate_id)
    }

    async fn get_events(&self, aggregate_id: &S::Id, since: &S) -> Result<Vec<E>, DomainError> {
        Ok(self
            .store
            .read()?
            .events_after(aggregate_id, since.latest_snapshot_version()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use simplecqrs_core::aggregate::AggregateRoot;
    use simplecqrs_core::repository::Repository;
    use simplecqrs_test_support::{TestAggregate, TestEvent, TestState, fixed_now, recorded_event};

    use super::*;

    type Store = InMemoryStore<TestState, TestEvent>;

    async fn seed(store: &Store, id: i64, count: usize) {
        let repo: Repository<TestAggregate, _> = Repository::new(store.session());
        let mut aggregate = repo.load(&id).await.unwrap();
        let expected = aggregate.version();
        for n in 0..count {
            aggregate.record(&format!("e{n}"), fixed_now());
        }
        repo.save(&mut aggregate, expected).await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_are_invisible_until_commit() {
        let store = Store::new();
        let session = store.session();

        session
            .append_event(&1, &recorded_event(1, "a", fixed_now()))
            .await
            .unwrap();

        assert_eq!(session.get_max_version(&1).await.unwrap(), 0);
        assert_eq!(session.staged_event_count().unwrap(), 1);
        session.commit().await.unwrap();
        assert_eq!(session.get_max_version(&1).await.unwrap(), 1);
        assert_eq!(session.staged_event_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_records_latest_snapshot_version_on_state() {
        let store = Store::new();

        seed(&store, 1, 3).await;

        let snapshot = store.snapshot(&1).unwrap().unwrap();
        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.latest_snapshot_version(), 3);
        assert_eq!(snapshot.counter, 3);
        assert_eq!(store.events(&1).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_non_contiguous_batch_is_discarded_whole() {
        let store = Store::new();
        seed(&store, 1, 2).await;
        let session = store.session();
        session
            .append_event(&2, &recorded_event(1, "other", fixed_now()))
            .await
            .unwrap();
        session
            .append_event(&1, &recorded_event(4, "gap", fixed_now()))
            .await
            .unwrap();

        let result = session.commit().await;

        match result {
            Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => {
                assert_eq!(aggregate_id, "1");
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert!(store.events(&2).unwrap().is_empty());
        assert_eq!(store.events(&1).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_events_skips_events_covered_by_snapshot() {
        let store = Store::new();
        seed(&store, 1, 3).await;
        seed(&store, 1, 1).await;
        let snapshot = store.snapshot(&1).unwrap().unwrap();
        let mut older = snapshot.clone();
        older.metadata.set_latest_snapshot_version(2);
        let session = store.session();

        let none = session.get_events(&1, &snapshot).await.unwrap();
        let some = session.get_events(&1, &older).await.unwrap();

        assert!(none.is_empty());
        let sequence: Vec<i64> = some.iter().map(DomainEvent::sequence_number).collect();
        assert_eq!(sequence, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_get_events_before_filters_by_creation_time() {
        let store = Store::new();
        let start = fixed_now();
        let writer = store.session();
        for (seq, offset) in [(1, 0), (2, 10), (3, 20)] {
            writer
                .append_event(
                    &1,
                    &recorded_event(seq, "x", start + Duration::minutes(offset)),
                )
                .await
                .unwrap();
        }
        writer.commit().await.unwrap();

        let events = store
            .session()
            .get_events_before(&1, start + Duration::minutes(10))
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_to_store_and_other_sessions() {
        // Arrange
        let store = Store::new();
        let writer = store.session();
        let reader = store.session();
        let state = TestState::new(1);

        // Act
        writer
            .append_event(&1, &recorded_event(1, "a", fixed_now()))
            .await
            .unwrap();
        writer.replace_snapshot(&1, 1, &state).await.unwrap();

        // Assert
        assert!(store.events(&1).unwrap().is_empty());
        assert!(store.snapshot(&1).unwrap().is_none());
        assert_eq!(reader.get_max_version(&1).await.unwrap(), 0);
        assert!(reader.get_events(&1, &state).await.unwrap().is_empty());
        assert!(store.list_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_session_discards_its_writes() {
        let store = Store::new();
        {
            let abandoned = store.session();
            abandoned
                .append_event(&1, &recorded_event(1, "a", fixed_now()))
                .await
                .unwrap();
        }

        let session = store.session();
        session
            .append_event(&1, &recorded_event(1, "b", fixed_now()))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let stored = store.events(&1).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "b");
    }

    #[tokio::test]
    async fn test_list_snapshots_returns_every_committed_aggregate() {
        let store = Store::new();
        seed(&store, 1, 1).await;
        seed(&store, 2, 2).await;

        let mut snapshots = store.list_snapshots().await.unwrap();
        snapshots.sort_by_key(|state| *state.id());

        let listed: Vec<(i64, i64)> = snapshots
            .iter()
            .map(|state| (*state.id(), state.version()))
            .collect();
        assert_eq!(listed, vec![(1, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn test_new_aggregate_is_created_saved_and_reloaded() {
        // Arrange
        let store = Store::new();
        let repo: Repository<TestAggregate, _> = Repository::new(store.session());
        let mut aggregate = repo.load(&42).await.unwrap();
        assert_eq!(aggregate.version(), 0);

        // Act
        aggregate.record("created", fixed_now());
        let pending: Vec<i64> = aggregate
            .pending_changes()
            .map(DomainEvent::sequence_number)
            .collect();
        let persisted = repo.save(&mut aggregate, 0).await.unwrap();
        let fresh: Repository<TestAggregate, _> = Repository::new(store.session());
        let reloaded = fresh.load(&42).await.unwrap();

        // Assert
        assert_eq!(pending, vec![1]);
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].sequence_number(), 1);
        assert_eq!(store.events(&42).unwrap(), persisted);

        let snapshot = store.snapshot(&42).unwrap().unwrap();
        assert_eq!(*snapshot.id(), 42);
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.latest_snapshot_version(), 1);
        assert_eq!(snapshot.name, "created");
        assert_eq!(snapshot.counter, 1);

        assert_eq!(reloaded.version(), 1);
        assert_eq!(reloaded.applied, 0);
        assert_eq!(reloaded.state().name, "created");
        assert_eq!(reloaded.last_modified(), Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_second_writer_with_stale_version_is_rejected() {
        let store = Store::new();
        seed(&store, 7, 3).await;
        let first: Repository<TestAggregate, _> = Repository::new(store.session());
        let second: Repository<TestAggregate, _> = Repository::new(store.session());
        let mut a = first.load(&7).await.unwrap();
        let mut b = second.load(&7).await.unwrap();
        assert_eq!(a.version(), 3);
        assert_eq!(b.version(), 3);
        a.record("from a", fixed_now());
        b.record("from b", fixed_now());

        first.save(&mut a, 3).await.unwrap();
        let result = second.save(&mut b, 3).await;

        match result {
            Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => {
                assert_eq!(aggregate_id, "7");
                assert_eq!(expected, 3);
                assert_eq!(actual, 4);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        let stored = store.events(&7).unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[3].name, "from a");
    }

    #[tokio::test]
    async fn test_interleaved_writers_lose_at_commit() {
        let store = Store::new();
        seed(&store, 7, 3).await;
        let first = store.session();
        let second = store.session();
        assert_eq!(first.get_max_version(&7).await.unwrap(), 3);
        assert_eq!(second.get_max_version(&7).await.unwrap(), 3);
        first
            .append_event(&7, &recorded_event(4, "a", fixed_now()))
            .await
            .unwrap();
        second
            .append_event(&7, &recorded_event(4, "b", fixed_now()))
            .await
            .unwrap();

        first.commit().await.unwrap();
        let result = second.commit().await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict {
                expected: 3,
                actual: 4,
                ..
            })
        ));
        assert_eq!(store.events(&7).unwrap()[3].name, "a");
    }

    #[tokio::test]
    async fn test_reload_after_save_matches_saved_state() {
        let store = Store::new();
        let repo: Repository<TestAggregate, _> = Repository::new(store.session());
        let mut aggregate = repo.load(&5).await.unwrap();
        aggregate.record("a", fixed_now());
        aggregate.record("b", fixed_now());
        let mut expected = aggregate.snapshot();
        expected.metadata.set_latest_snapshot_version(2);

        repo.save(&mut aggregate, 0).await.unwrap();
        let reloaded = repo.load(&5).await.unwrap();
        let replayed = repo.load_with(&5, true).await.unwrap();

        assert_eq!(reloaded.snapshot(), expected);
        assert_eq!(reloaded.applied, 0);
        assert_eq!(replayed.applied, 2);
        assert_eq!(replayed.version(), 2);
    }
}
