//! `PostgreSQL` implementation of the `Storage` trait.

use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use simplecqrs_core::error::DomainError;
use simplecqrs_core::event::DomainEvent;
use simplecqrs_core::state::EntityState;
use simplecqrs_core::storage::{SnapshotListing, Storage};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::StoreError;

const SELECT_MAX_VERSION: &str = "SELECT MAX(sequence_number) FROM domain_events \
     WHERE aggregate_type = $1 AND aggregate_id = $2";

const SELECT_EVENTS_AFTER: &str = "SELECT payload FROM domain_events \
     WHERE aggregate_type = $1 AND aggregate_id = $2 AND sequence_number > $3 \
     ORDER BY sequence_number";

const SELECT_EVENTS_BEFORE: &str = "SELECT payload FROM domain_events \
     WHERE aggregate_type = $1 AND aggregate_id = $2 AND created_at <= $3 \
     ORDER BY sequence_number";

const SELECT_SNAPSHOT: &str = "SELECT state FROM aggregate_snapshots \
     WHERE aggregate_type = $1 AND aggregate_id = $2";

const SELECT_ALL_SNAPSHOTS: &str = "SELECT state FROM aggregate_snapshots \
     WHERE aggregate_type = $1 ORDER BY aggregate_id";

const INSERT_EVENT: &str = "INSERT INTO domain_events \
     (event_id, aggregate_type, aggregate_id, event_type, sequence_number, payload, \
      correlation_id, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const UPSERT_SNAPSHOT: &str = "INSERT INTO aggregate_snapshots \
     (aggregate_type, aggregate_id, version, latest_snapshot_version, last_modified, state) \
     VALUES ($1, $2, $3, $4, $5, $6) \
     ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE SET \
     version = EXCLUDED.version, \
     latest_snapshot_version = EXCLUDED.latest_snapshot_version, \
     last_modified = EXCLUDED.last_modified, \
     state = EXCLUDED.state";

/// Applies the bundled migrations to `pool`.
///
/// # Errors
///
/// Returns `StoreError::Migrate` if a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug)]
struct EventRow {
    event_id: Uuid,
    aggregate_id: String,
    event_type: &'static str,
    sequence_number: i64,
    payload: serde_json::Value,
    correlation_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SnapshotRow {
    aggregate_id: String,
    version: i64,
    latest_snapshot_version: i64,
    last_modified: Option<DateTime<Utc>>,
    state: serde_json::Value,
}

#[derive(Debug)]
enum StagedWrite {
    Event(EventRow),
    Snapshot(SnapshotRow),
}

/// PostgreSQL-backed storage for one aggregate type.
///
/// A value is one unit of work: appends and snapshots are serialized as they
/// are staged and written in a single transaction by `commit`. Events are
/// stored whole as JSON in `payload`; the remaining columns duplicate
/// metadata for querying.
#[derive(Debug)]
pub struct PgStorage<S, E> {
    pool: PgPool,
    staged: Mutex<Vec<StagedWrite>>,
    _types: PhantomData<fn() -> (S, E)>,
}

impl<S, E> PgStorage<S, E>
where
    S: EntityState + Serialize + DeserializeOwned,
    E: DomainEvent + Serialize + DeserializeOwned,
{
    /// Creates a new unit of work over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            staged: Mutex::new(Vec::new()),
            _types: PhantomData,
        }
    }

    fn lock_staged(&self) -> Result<MutexGuard<'_, Vec<StagedWrite>>, StoreError> {
        self.staged.lock().map_err(|_| StoreError::Poisoned)
    }

    fn stage(&self, write: StagedWrite) -> Result<(), StoreError> {
        self.lock_staged()?.push(write);
        Ok(())
    }

    fn take_staged(&self) -> Result<Vec<StagedWrite>, StoreError> {
        Ok(std::mem::take(&mut *self.lock_staged()?))
    }

    async fn max_version_of(&self, aggregate_id: &str) -> Result<i64, StoreError> {
        let max: Option<i64> = sqlx::query_scalar(SELECT_MAX_VERSION)
            .bind(S::AGGREGATE_TYPE)
            .bind(aggregate_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    fn decode_events(payloads: Vec<serde_json::Value>) -> Result<Vec<E>, StoreError> {
        payloads
            .into_iter()
            .map(|payload| serde_json::from_value(payload).map_err(StoreError::from))
            .collect()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl<S, E> Storage<S, E> for PgStorage<S, E>
where
    S: EntityState + Serialize + DeserializeOwned,
    E: DomainEvent + Serialize + DeserializeOwned,
{
    async fn get_max_version(&self, aggregate_id: &S::Id) -> Result<i64, DomainError> {
        Ok(self.max_version_of(&aggregate_id.to_string()).await?)
    }

    async fn append_event(&self, aggregate_id: &S::Id, event: &E) -> Result<(), DomainError> {
        let metadata = event.metadata();
        let row = EventRow {
            event_id: metadata.event_id(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event.event_type(),
            sequence_number: metadata.sequence_number(),
            payload: serde_json::to_value(event).map_err(StoreError::from)?,
            correlation_id: metadata.correlation_id(),
            created_at: metadata.created_at(),
        };
        self.stage(StagedWrite::Event(row))?;
        Ok(())
    }

    async fn replace_snapshot(
        &self,
        aggregate_id: &S::Id,
        latest_snapshot_version: i64,
        state: &S,
    ) -> Result<(), DomainError> {
        let mut state = state.clone();
        state
            .metadata_mut()
            .set_latest_snapshot_version(latest_snapshot_version);
        let row = SnapshotRow {
            aggregate_id: aggregate_id.to_string(),
            version: state.version(),
            latest_snapshot_version,
            last_modified: state.metadata().last_modified(),
            state: serde_json::to_value(&state).map_err(StoreError::from)?,
        };
        self.stage(StagedWrite::Snapshot(row))?;
        Ok(())
    }

    #[instrument(skip(self), fields(aggregate_type = S::AGGREGATE_TYPE))]
    async fn commit(&self) -> Result<(), DomainError> {
        let staged = self.take_staged()?;
        if staged.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        for write in &staged {
            match write {
                StagedWrite::Event(row) => {
                    let inserted = sqlx::query(INSERT_EVENT)
                        .bind(row.event_id)
                        .bind(S::AGGREGATE_TYPE)
                        .bind(&row.aggregate_id)
                        .bind(row.event_type)
                        .bind(row.sequence_number)
                        .bind(&row.payload)
                        .bind(row.correlation_id)
                        .bind(row.created_at)
                        .execute(&mut *tx)
                        .await;
                    match inserted {
                        Ok(_) => {}
                        Err(err) if is_unique_violation(&err) => {
                            tx.rollback().await.map_err(StoreError::from)?;
                            let actual = self.max_version_of(&row.aggregate_id).await?;
                            warn!(
                                aggregate_id = %row.aggregate_id,
                                sequence_number = row.sequence_number,
                                actual,
                                "event sequence already taken"
                            );
                            return Err(DomainError::ConcurrencyConflict {
                                aggregate_id: row.aggregate_id.clone(),
                                expected: row.sequence_number - 1,
                                actual,
                            });
                        }
                        Err(err) => return Err(StoreError::from(err).into()),
                    }
                }
                StagedWrite::Snapshot(row) => {
                    sqlx::query(UPSERT_SNAPSHOT)
                        .bind(S::AGGREGATE_TYPE)
                        .bind(&row.aggregate_id)
                        .bind(row.version)
                        .bind(row.latest_snapshot_version)
                        .bind(row.last_modified)
                        .bind(&row.state)
                        .execute(&mut *tx)
                        .await
                        .map_err(StoreError::from)?;
                }
            }
        }
        tx.commit().await.map_err(StoreError::from)?;

        debug!(writes = staged.len(), "transaction committed");
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &S::Id) -> Result<Option<S>, DomainError> {
        let state: Option<serde_json::Value> = sqlx::query_scalar(SELECT_SNAPSHOT)
            .bind(S::AGGREGATE_TYPE)
            .bind(aggregate_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        match state {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    async fn get_events(&self, aggregate_id: &S::Id, since: &S) -> Result<Vec<E>, DomainError> {
        let payloads: Vec<serde_json::Value> = sqlx::query_scalar(SELECT_EVENTS_AFTER)
            .bind(S::AGGREGATE_TYPE)
            .bind(aggregate_id.to_string())
            .bind(since.latest_snapshot_version())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(Self::decode_events(payloads)?)
    }

    async fn get_events_before(
        &self,
        aggregate_id: &S::Id,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<E>, DomainError> {
        let payloads: Vec<serde_json::Value> = sqlx::query_scalar(SELECT_EVENTS_BEFORE)
            .bind(S::AGGREGATE_TYPE)
            .bind(aggregate_id.to_string())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(Self::decode_events(payloads)?)
    }
}

#[async_trait]
impl<S, E> SnapshotListing<S> for PgStorage<S, E>
where
    S: EntityState + Serialize + DeserializeOwned,
    E: DomainEvent + Serialize + DeserializeOwned,
{
    async fn list_snapshots(&self) -> Result<Vec<S>, DomainError> {
        let states: Vec<serde_json::Value> = sqlx::query_scalar(SELECT_ALL_SNAPSHOTS)
            .bind(S::AGGREGATE_TYPE)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let states = states
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<S>, _>>()
            .map_err(StoreError::from)?;
        Ok(states)
    }
}
