//! Query handlers for the user-management context.
//!
//! Handlers rebuild the aggregate through the repository and return
//! read-only view DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use simplecqrs_core::aggregate::AggregateRoot;
use simplecqrs_core::error::DomainError;
use simplecqrs_core::event::DomainEvent;
use simplecqrs_core::state::EntityState;
use simplecqrs_core::storage::{SnapshotListing, Storage};
use uuid::Uuid;

use crate::application::command_handlers::UserRepository;
use crate::domain::aggregates::UserAggregate;
use crate::domain::events::UserEvent;
use crate::domain::state::User;

/// Read-only view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    /// The user identifier.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Contact email address.
    pub email: String,
    /// Age in years.
    pub age: i32,
    /// Current version (sequence number of the last applied event).
    pub version: i64,
    /// When the last applied event was created.
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<&UserAggregate> for UserView {
    fn from(user: &UserAggregate) -> Self {
        let state = user.state();
        Self {
            user_id: *user.id(),
            name: state.name.clone(),
            email: state.email.clone(),
            age: state.age,
            version: user.version(),
            last_modified: user.last_modified(),
        }
    }
}

/// Read-only view of one recorded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    /// The event identifier.
    pub event_id: Uuid,
    /// The event type identifier, e.g. `user.created`.
    pub event_type: &'static str,
    /// Position in the user's history.
    pub sequence_number: i64,
    /// The correlation ID of the command that produced the event.
    pub correlation_id: Uuid,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
    /// Event-specific payload.
    pub payload: serde_json::Value,
}

impl TryFrom<&UserEvent> for EventView {
    type Error = DomainError;

    fn try_from(event: &UserEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: event.metadata.event_id(),
            event_type: event.event_type(),
            sequence_number: event.sequence_number(),
            correlation_id: event.metadata.correlation_id(),
            created_at: event.created_at(),
            payload: event.payload()?,
        })
    }
}

/// A user together with its ordered event history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDetails {
    /// Current view of the user.
    pub user: UserView,
    /// Every recorded event, oldest first.
    pub events: Vec<EventView>,
}

fn not_found(user_id: i64) -> DomainError {
    DomainError::AggregateNotFound(format!("user {user_id}"))
}

/// Retrieves the current view of a user.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the user has no history, or
/// any storage error.
pub async fn get_user<St>(user_id: i64, repo: &UserRepository<St>) -> Result<UserView, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let user = repo.load(&user_id).await?;
    if user.version() == 0 {
        return Err(not_found(user_id));
    }
    Ok(UserView::from(&user))
}

/// Retrieves the user as it was at `cutoff`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the user had no history at
/// that instant, or any storage error.
pub async fn get_user_as_of<St>(
    user_id: i64,
    cutoff: DateTime<Utc>,
    repo: &UserRepository<St>,
) -> Result<UserView, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let user = repo.load_as_of(&user_id, cutoff).await?;
    if user.version() == 0 {
        return Err(not_found(user_id));
    }
    Ok(UserView::from(&user))
}

/// Lists every recorded event of a user, oldest first.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the user has no history, or
/// any storage error.
pub async fn get_user_history<St>(
    user_id: i64,
    repo: &UserRepository<St>,
) -> Result<Vec<EventView>, DomainError>
where
    St: Storage<User, UserEvent>,
{
    let mut events = repo
        .storage()
        .get_events(&user_id, &User::new(user_id))
        .await?;
    if events.is_empty() {
        return Err(not_found(user_id));
    }
    events.sort_by_key(DomainEvent::sequence_number);
    events.iter().map(EventView::try_from).collect()
}

/// Lists every stored user with its history, ordered by user id.
///
/// `listing` only supplies the ids; each user is then loaded through `repo`
/// so events recorded after its snapshot are included.
///
/// # Errors
///
/// Returns any storage error from the listing or the repository.
pub async fn list_users<L, St>(
    listing: &L,
    repo: &UserRepository<St>,
) -> Result<Vec<UserDetails>, DomainError>
where
    L: SnapshotListing<User> + ?Sized,
    St: Storage<User, UserEvent>,
{
    let mut ids: Vec<i64> = listing
        .list_snapshots()
        .await?
        .iter()
        .map(|user| *user.id())
        .collect();
    ids.sort_unstable();

    let mut users = Vec::with_capacity(ids.len());
    for user_id in ids {
        let user = get_user(user_id, repo).await?;
        let events = get_user_history(user_id, repo).await?;
        users.push(UserDetails { user, events });
    }
    Ok(users)
}
