//! Command handlers for the user-management context.
//!
//! Each handler loads the aggregate through the repository, runs the domain
//! method and saves the resulting events. The persisted events are returned
//! so callers can report ids and the new version.

use simplecqrs_core::aggregate::AggregateRoot;
use simplecqrs_core::clock::Clock;
use simplecqrs_core::error::DomainError;
use simplecqrs_core::repository::Repository;
use simplecqrs_core::storage::Storage;
use tracing::debug;

use crate::domain::aggregates::UserAggregate;
use crate::domain::commands::{ChangeAge, ChangeEmail, ChangeName, CreateUser};
use crate::domain::events::UserEvent;
use crate::domain::state::User;

/// Repository specialised to the user aggregate.
pub type UserRepository<St> = Repository<UserAggregate, St>;

/// Handles the `CreateUser` command. The user must have no history, so the
/// save always expects version 0.
///
/// # Errors
///
/// Returns `DomainError::AlreadyExists` if the user already exists,
/// `DomainError::Validation` for invalid input, or any storage error.
pub async fn handle_create_user<St>(
    command: &CreateUser,
    clock: &dyn Clock,
    repo: &UserRepository<St>,
) -> Result<Vec<UserEvent>, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let mut user = repo.load(&command.user_id).await?;
    user.create(
        &command.name,
        &command.email,
        command.age,
        command.correlation_id,
        clock,
    )?;
    repo.save(&mut user, 0).await
}

/// Handles the `ChangeName` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown user,
/// `DomainError::ConcurrencyConflict` when the expected version is stale,
/// `DomainError::Validation` for invalid input, or any storage error.
pub async fn handle_change_name<St>(
    command: &ChangeName,
    clock: &dyn Clock,
    repo: &UserRepository<St>,
) -> Result<Vec<UserEvent>, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let mut user = repo.load(&command.user_id).await?;
    let expected = expected_version(&user, command.expected_version);
    user.change_name(&command.name, command.correlation_id, clock)?;
    save_changes(repo, &mut user, expected).await
}

/// Handles the `ChangeEmail` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown user,
/// `DomainError::ConcurrencyConflict` when the expected version is stale,
/// `DomainError::Validation` for invalid input, or any storage error.
pub async fn handle_change_email<St>(
    command: &ChangeEmail,
    clock: &dyn Clock,
    repo: &UserRepository<St>,
) -> Result<Vec<UserEvent>, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let mut user = repo.load(&command.user_id).await?;
    let expected = expected_version(&user, command.expected_version);
    user.change_email(&command.email, command.correlation_id, clock)?;
    save_changes(repo, &mut user, expected).await
}

/// Handles the `ChangeAge` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown user,
/// `DomainError::ConcurrencyConflict` when the expected version is stale,
/// `DomainError::Validation` for invalid input, or any storage error.
pub async fn handle_change_age<St>(
    command: &ChangeAge,
    clock: &dyn Clock,
    repo: &UserRepository<St>,
) -> Result<Vec<UserEvent>, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let mut user = repo.load(&command.user_id).await?;
    let expected = expected_version(&user, command.expected_version);
    user.change_age(command.age, command.correlation_id, clock)?;
    save_changes(repo, &mut user, expected).await
}

fn expected_version(user: &UserAggregate, requested: Option<i64>) -> i64 {
    requested.unwrap_or_else(|| user.original_version())
}

async fn save_changes<St>(
    repo: &UserRepository<St>,
    user: &mut UserAggregate,
    expected: i64,
) -> Result<Vec<UserEvent>, DomainError>
where
    St: Storage<User, UserEvent>,
{
    if !user.has_pending_changes() {
        debug!(user_id = user.id(), "value unchanged, nothing recorded");
    }
    repo.save(user, expected).await
}

#[cfg(test)]
mod tests {
    use simplecqrs_core::event::DomainEvent;
    use simplecqrs_core::state::EntityState;
    use simplecqrs_store::memory::InMemoryStore;
    use simplecqrs_test_support::{
        EmptyStorage, FailingStorage, FixedClock, RecordingStorage, StorageCall, fixed_now,
    };
    use uuid::Uuid;

    use super::*;
    use crate::domain::events::{EmailChanged, UserEventKind};

    fn create_command(user_id: i64) -> CreateUser {
        CreateUser {
            correlation_id: Uuid::new_v4(),
            user_id,
            name: "Ada Lovelace".to_owned(),
            email: "ada@example.com".to_owned(),
            age: 36,
        }
    }

    async fn seeded(store: &InMemoryStore<User, UserEvent>, user_id: i64) {
        let repo = Repository::new(store.session());
        handle_create_user(&create_command(user_id), &FixedClock::default(), &repo)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_create_user_persists_user_created_event() {
        // Arrange
        let command = create_command(42);
        let repo: UserRepository<_> = Repository::new(RecordingStorage::new());

        // Act
        let events = handle_create_user(&command, &FixedClock::default(), &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), "user.created");
        assert_eq!(event.sequence_number(), 1);
        assert_eq!(event.metadata.correlation_id(), command.correlation_id);
        assert_eq!(event.created_at(), fixed_now());

        let calls = repo.storage().calls();
        assert_eq!(calls[2], StorageCall::GetMaxVersion(42));
        assert_eq!(repo.storage().appended_events(), events);
        assert_eq!(calls.last(), Some(&StorageCall::Commit));
    }

    #[tokio::test]
    async fn test_handle_create_user_rejects_existing_user() {
        // Arrange
        let store = InMemoryStore::new();
        seeded(&store, 1).await;
        let repo = Repository::new(store.session());

        // Act
        let result = handle_create_user(&create_command(1), &FixedClock::default(), &repo).await;

        // Assert
        assert!(matches!(result, Err(DomainError::AlreadyExists(_))));
        assert_eq!(store.events(&1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_change_name_on_unknown_user_is_not_found() {
        let repo: UserRepository<_> = Repository::new(EmptyStorage);
        let command = ChangeName {
            correlation_id: Uuid::new_v4(),
            user_id: 3,
            name: "Ada".to_owned(),
            expected_version: None,
        };

        let result = handle_change_name(&command, &FixedClock::default(), &repo).await;

        match result {
            Err(DomainError::AggregateNotFound(msg)) => assert_eq!(msg, "user 3"),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_change_email_appends_event_at_next_version() {
        // Arrange
        let store = InMemoryStore::new();
        seeded(&store, 1).await;
        let repo = Repository::new(store.session());
        let command = ChangeEmail {
            correlation_id: Uuid::new_v4(),
            user_id: 1,
            email: "lovelace@example.com".to_owned(),
            expected_version: None,
        };

        // Act
        let events = handle_change_email(&command, &FixedClock::default(), &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number(), 2);
        assert_eq!(
            events[0].kind,
            UserEventKind::EmailChanged(EmailChanged {
                email: "lovelace@example.com".to_owned()
            })
        );
        let snapshot = store.snapshot(&1).unwrap().unwrap();
        assert_eq!(snapshot.email, "lovelace@example.com");
        assert_eq!(snapshot.version(), 2);
    }

    #[tokio::test]
    async fn test_handle_change_age_with_same_value_saves_nothing() {
        let store = InMemoryStore::new();
        seeded(&store, 1).await;
        let repo = Repository::new(store.session());
        let command = ChangeAge {
            correlation_id: Uuid::new_v4(),
            user_id: 1,
            age: 36,
            expected_version: None,
        };

        let events = handle_change_age(&command, &FixedClock::default(), &repo)
            .await
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(store.events(&1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_change_name_with_stale_expected_version_conflicts() {
        // Arrange
        let store = InMemoryStore::new();
        seeded(&store, 1).await;
        let clock = FixedClock::default();
        let first = ChangeAge {
            correlation_id: Uuid::new_v4(),
            user_id: 1,
            age: 37,
            expected_version: Some(1),
        };
        handle_change_age(&first, &clock, &Repository::new(store.session()))
            .await
            .unwrap();
        let stale = ChangeName {
            correlation_id: Uuid::new_v4(),
            user_id: 1,
            name: "Augusta".to_owned(),
            expected_version: Some(1),
        };

        // Act
        let result = handle_change_name(&stale, &clock, &Repository::new(store.session())).await;

        // Assert
        match result {
            Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => {
                assert_eq!(aggregate_id, "1");
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(store.events(&1).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_change_age_on_unknown_user_appends_nothing() {
        let repo: UserRepository<_> = Repository::new(RecordingStorage::new());
        let command = ChangeAge {
            correlation_id: Uuid::new_v4(),
            user_id: 1,
            age: 0,
            expected_version: None,
        };

        let result = handle_change_age(&command, &FixedClock::default(), &repo).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
        assert!(repo.storage().appended_events().is_empty());
    }

    #[tokio::test]
    async fn test_handle_create_user_propagates_storage_failure() {
        let repo: UserRepository<_> = Repository::new(FailingStorage);

        let result = handle_create_user(&create_command(1), &FixedClock::default(), &repo).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_fresh_user_state_matches_new() {
        let store: InMemoryStore<User, UserEvent> = InMemoryStore::new();
        let repo = Repository::new(store.session());

        let user: UserAggregate = repo.load(&8).await.unwrap();

        assert_eq!(user.snapshot(), User::new(8));
    }
}
