//! Integration tests for `PgStorage`. They need a reachable database in
//! `DATABASE_URL`.

use chrono::Duration;
use simplecqrs_core::aggregate::AggregateRoot;
use simplecqrs_core::error::DomainError;
use simplecqrs_core::event::DomainEvent;
use simplecqrs_core::repository::Repository;
use simplecqrs_core::state::EntityState;
use simplecqrs_core::storage::{SnapshotListing, Storage};
use simplecqrs_store::postgres::PgStorage;
use simplecqrs_test_support::{TestAggregate, TestEvent, TestState, fixed_now, recorded_event};
use sqlx::PgPool;

type Pg = PgStorage<TestState, TestEvent>;

fn repository(pool: &PgPool) -> Repository<TestAggregate, Pg> {
    Repository::new(PgStorage::new(pool.clone()))
}

// --- reads on an empty database ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_aggregate_has_no_history(pool: PgPool) {
    let storage = Pg::new(pool);

    assert_eq!(storage.get_max_version(&1).await.unwrap(), 0);
    assert!(storage.get_snapshot(&1).await.unwrap().is_none());
    assert!(
        storage
            .get_events(&1, &TestState::new(1))
            .await
            .unwrap()
            .is_empty()
    );
}

// --- commit ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_nothing_is_written_before_commit(pool: PgPool) {
    let storage = Pg::new(pool.clone());

    storage
        .append_event(&1, &recorded_event(1, "a", fixed_now()))
        .await
        .unwrap();
    storage
        .replace_snapshot(&1, 1, &TestState::new(1))
        .await
        .unwrap();

    let reader = Pg::new(pool);
    assert_eq!(reader.get_max_version(&1).await.unwrap(), 0);
    assert!(reader.get_snapshot(&1).await.unwrap().is_none());
    assert!(reader.list_snapshots().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_and_reload_round_trip(pool: PgPool) {
    let repo = repository(&pool);
    let mut aggregate = repo.load(&42).await.unwrap();
    aggregate.record("first", fixed_now());
    aggregate.record("second", fixed_now());

    let persisted = repo.save(&mut aggregate, 0).await.unwrap();

    assert_eq!(persisted.len(), 2);
    let reloaded = repository(&pool).load(&42).await.unwrap();
    assert_eq!(reloaded.version(), 2);
    assert_eq!(reloaded.latest_snapshot_version(), 2);
    assert_eq!(reloaded.state().name, "second");
    assert_eq!(reloaded.applied, 0);

    let events = Pg::new(pool)
        .get_events(&42, &TestState::new(42))
        .await
        .unwrap();
    let sequence: Vec<i64> = events.iter().map(DomainEvent::sequence_number).collect();
    assert_eq!(sequence, vec![1, 2]);
    assert_eq!(events[0].metadata.event_id(), persisted[0].metadata.event_id());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_snapshot_is_replaced_on_every_save(pool: PgPool) {
    let repo = repository(&pool);
    let mut aggregate = repo.load(&3).await.unwrap();
    aggregate.record("a", fixed_now());
    repo.save(&mut aggregate, 0).await.unwrap();

    let repo = repository(&pool);
    let mut aggregate = repo.load(&3).await.unwrap();
    aggregate.record("b", fixed_now());
    repo.save(&mut aggregate, 1).await.unwrap();

    let snapshot = Pg::new(pool).get_snapshot(&3).await.unwrap().unwrap();
    assert_eq!(snapshot.version(), 2);
    assert_eq!(snapshot.latest_snapshot_version(), 2);
    assert_eq!(snapshot.name, "b");
}

// --- concurrency ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_sequence_number_is_a_conflict(pool: PgPool) {
    let first = Pg::new(pool.clone());
    let second = Pg::new(pool.clone());
    first
        .append_event(&7, &recorded_event(1, "a", fixed_now()))
        .await
        .unwrap();
    second
        .append_event(&7, &recorded_event(1, "b", fixed_now()))
        .await
        .unwrap();

    first.commit().await.unwrap();
    let result = second.commit().await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 0,
            actual: 1,
            ..
        })
    ));
    let events = Pg::new(pool)
        .get_events(&7, &TestState::new(7))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "a");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_writer_is_rejected_by_repository(pool: PgPool) {
    let repo = repository(&pool);
    let mut aggregate = repo.load(&7).await.unwrap();
    aggregate.record("seed", fixed_now());
    repo.save(&mut aggregate, 0).await.unwrap();

    let repo_a = repository(&pool);
    let repo_b = repository(&pool);
    let mut a = repo_a.load(&7).await.unwrap();
    let mut b = repo_b.load(&7).await.unwrap();
    a.record("a", fixed_now());
    b.record("b", fixed_now());
    repo_a.save(&mut a, 1).await.unwrap();

    let result = repo_b.save(&mut b, 1).await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 1,
            actual: 2,
            ..
        })
    ));
}

// --- point in time ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_events_before_filters_in_sql(pool: PgPool) {
    let storage = Pg::new(pool.clone());
    let start = fixed_now();
    for (seq, minutes) in [(1, 0), (2, 5), (3, 10)] {
        storage
            .append_event(
                &9,
                &recorded_event(seq, "x", start + Duration::minutes(minutes)),
            )
            .await
            .unwrap();
    }
    storage.commit().await.unwrap();

    let events = Pg::new(pool)
        .get_events_before(&9, start + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
}

// --- listing ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_snapshots_returns_committed_aggregates(pool: PgPool) {
    for id in [2, 1] {
        let repo = repository(&pool);
        let mut aggregate = repo.load(&id).await.unwrap();
        aggregate.record(&format!("user {id}"), fixed_now());
        repo.save(&mut aggregate, 0).await.unwrap();
    }

    let snapshots = Pg::new(pool).list_snapshots().await.unwrap();

    let ids: Vec<i64> = snapshots.iter().map(|state| *state.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(snapshots[0].name, "user 1");
}
