//! Mock `Storage` and `SnapshotListing` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use simplecqrs_core::error::DomainError;
use simplecqrs_core::event::DomainEvent;
use simplecqrs_core::state::EntityState;
use simplecqrs_core::storage::{SnapshotListing, Storage};

/// One call made against a `RecordingStorage`, with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageCall<S, E>
where
    S: EntityState,
{
    /// `get_max_version(id)`
    GetMaxVersion(S::Id),
    /// `append_event(id, event)`
    AppendEvent(S::Id, E),
    /// `replace_snapshot(id, latest_snapshot_version, state)`
    ReplaceSnapshot(S::Id, i64, S),
    /// `commit()`
    Commit,
    /// `get_snapshot(id)`
    GetSnapshot(S::Id),
    /// `get_events(id, since)`
    GetEvents(S::Id, S),
    /// `get_events_before(id, cutoff)`
    GetEventsBefore(S::Id, DateTime<Utc>),
}

/// A storage that returns scripted answers and records every call in order.
///
/// Reads return the configured values regardless of the arguments; writes
/// always succeed unless `failing_commit` was requested.
#[derive(Debug)]
pub struct RecordingStorage<S, E>
where
    S: EntityState,
{
    max_version: i64,
    snapshot: Option<S>,
    events: Vec<E>,
    fail_commit: bool,
    calls: Mutex<Vec<StorageCall<S, E>>>,
}

impl<S, E> Default for RecordingStorage<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> RecordingStorage<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    /// A storage reporting version 0, no snapshot and no events.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_version: 0,
            snapshot: None,
            events: Vec::new(),
            fail_commit: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `get_max_version` with `version`.
    #[must_use]
    pub fn with_max_version(mut self, version: i64) -> Self {
        self.max_version = version;
        self
    }

    /// Answer `get_snapshot` with `snapshot`.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: S) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Answer `get_events` and `get_events_before` with `events`.
    #[must_use]
    pub fn with_events(mut self, events: Vec<E>) -> Self {
        self.events = events;
        self
    }

    /// Make `commit` fail with an infrastructure error.
    #[must_use]
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Returns every call made so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<StorageCall<S, E>> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the events passed to `append_event`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<E> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                StorageCall::AppendEvent(_, event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StorageCall<S, E>) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<S, E> Storage<S, E> for RecordingStorage<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    async fn get_max_version(&self, aggregate_id: &S::Id) -> Result<i64, DomainError> {
        self.record(StorageCall::GetMaxVersion(aggregate_id.clone()));
        Ok(self.max_version)
    }

    async fn append_event(&self, aggregate_id: &S::Id, event: &E) -> Result<(), DomainError> {
        self.record(StorageCall::AppendEvent(aggregate_id.clone(), event.clone()));
        Ok(())
    }

    async fn replace_snapshot(
        &self,
        aggregate_id: &S::Id,
        latest_snapshot_version: i64,
        state: &S,
    ) -> Result<(), DomainError> {
        self.record(StorageCall::ReplaceSnapshot(
            aggregate_id.clone(),
            latest_snapshot_version,
            state.clone(),
        ));
        Ok(())
    }

    async fn commit(&self) -> Result<(), DomainError> {
        self.record(StorageCall::Commit);
        if self.fail_commit {
            return Err(DomainError::Infrastructure("commit rejected".into()));
        }
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        self.record(StorageCall::GetSnapshot(aggregate_id.clone()));
        Ok(self.snapshot.clone())
    }

    async fn get_events(&self, aggregate_id: &S::Id, since: &S) -> Result<Vec<E>, DomainError> {
        self.record(StorageCall::GetEvents(aggregate_id.clone(), since.clone()));
        Ok(self.events.clone())
    }

    async fn get_events_before(
        &self,
        aggregate_id: &S::Id,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<E>, DomainError> {
        self.record(StorageCall::GetEventsBefore(aggregate_id.clone(), cutoff));
        Ok(self.events.clone())
    }
}

/// A storage with no data that silently accepts writes. Useful for testing
/// "aggregate not found" scenarios and creation commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStorage;

#[async_trait]
impl<S, E> Storage<S, E> for EmptyStorage
where
    S: EntityState,
    E: DomainEvent,
{
    async fn get_max_version(&self, _aggregate_id: &S::Id) -> Result<i64, DomainError> {
        Ok(0)
    }

    async fn append_event(&self, _aggregate_id: &S::Id, _event: &E) -> Result<(), DomainError> {
        Ok(())
    }

    async fn replace_snapshot(
        &self,
        _aggregate_id: &S::Id,
        _latest_snapshot_version: i64,
        _state: &S,
    ) -> Result<(), DomainError> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn get_snapshot(&self, _aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        Ok(None)
    }

    async fn get_events(&self, _aggregate_id: &S::Id, _since: &S) -> Result<Vec<E>, DomainError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl<S: EntityState> SnapshotListing<S> for EmptyStorage {
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError> {
        Ok(Vec::new())
    }
}

/// A storage that fails every call with an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStorage;

impl FailingStorage {
    fn error() -> DomainError {
        DomainError::Infrastructure("connection refused".into())
    }
}

#[async_trait]
impl<S, E> Storage<S, E> for FailingStorage
where
    S: EntityState,
    E: DomainEvent,
{
    async fn get_max_version(&self, _aggregate_id: &S::Id) -> Result<i64, DomainError> {
        Err(Self::error())
    }

    async fn append_event(&self, _aggregate_id: &S::Id, _event: &E) -> Result<(), DomainError> {
        Err(Self::error())
    }

    async fn replace_snapshot(
        &self,
        _aggregate_id: &S::Id,
        _latest_snapshot_version: i64,
        _state: &S,
    ) -> Result<(), DomainError> {
        Err(Self::error())
    }

    async fn commit(&self) -> Result<(), DomainError> {
        Err(Self::error())
    }

    async fn get_snapshot(&self, _aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        Err(Self::error())
    }

    async fn get_events(&self, _aggregate_id: &S::Id, _since: &S) -> Result<Vec<E>, DomainError> {
        Err(Self::error())
    }
}

#[async_trait]
impl<S: EntityState> SnapshotListing<S> for FailingStorage {
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError> {
        Err(Self::error())
    }
}
