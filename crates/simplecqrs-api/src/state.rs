//! Shared application state.

use std::fmt::{self, Debug};
use std::sync::Arc;

use simplecqrs_core::clock::Clock;
use simplecqrs_core::repository::Repository;
use simplecqrs_core::storage::{SnapshotListing, Storage};
use simplecqrs_store::memory::InMemoryStore;
use simplecqrs_store::postgres::PgStorage;
use simplecqrs_users::application::command_handlers::UserRepository;
use simplecqrs_users::domain::events::UserEvent;
use simplecqrs_users::domain::state::User;
use sqlx::PgPool;

/// A storage unit of work for the user aggregate.
pub type UserStorage = Box<dyn Storage<User, UserEvent>>;

/// Read-side listing of stored users.
pub type UserListing = Box<dyn SnapshotListing<User>>;

/// Opens a fresh storage unit of work for each request.
pub trait StorageProvider: Debug + Send + Sync {
    /// Returns a new, empty unit of work.
    fn open(&self) -> UserStorage;

    /// Returns a listing over the committed user snapshots.
    fn listing(&self) -> UserListing;
}

impl StorageProvider for InMemoryStore<User, UserEvent> {
    fn open(&self) -> UserStorage {
        Box::new(self.session())
    }

    fn listing(&self) -> UserListing {
        Box::new(self.clone())
    }
}

impl StorageProvider for PgPool {
    fn open(&self) -> UserStorage {
        Box::new(PgStorage::<User, UserEvent>::new(self.clone()))
    }

    fn listing(&self) -> UserListing {
        Box::new(PgStorage::<User, UserEvent>::new(self.clone()))
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock used to stamp new events.
    pub clock: Arc<dyn Clock>,
    /// Source of per-request storage.
    pub storage: Arc<dyn StorageProvider>,
}

impl Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, storage: Arc<dyn StorageProvider>) -> Self {
        Self { clock, storage }
    }

    /// A user repository over a new unit of work.
    #[must_use]
    pub fn users(&self) -> UserRepository<UserStorage> {
        Repository::new(self.storage.open())
    }

    /// A listing of the stored users.
    #[must_use]
    pub fn user_listing(&self) -> UserListing {
        self.storage.listing()
    }
}
