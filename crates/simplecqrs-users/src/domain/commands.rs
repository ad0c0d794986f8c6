//! Commands for the user-management context.

use uuid::Uuid;

/// Command to register a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The identifier of the user to create.
    pub user_id: i64,
    /// The user's name.
    pub name: String,
    /// The user's email address.
    pub email: String,
    /// The user's age.
    pub age: i32,
}

/// Command to rename a user.
#[derive(Debug, Clone)]
pub struct ChangeName {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user identifier.
    pub user_id: i64,
    /// The new name.
    pub name: String,
    /// Version the caller last observed; defaults to the loaded version.
    pub expected_version: Option<i64>,
}

/// Command to change a user's email address.
#[derive(Debug, Clone)]
pub struct ChangeEmail {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user identifier.
    pub user_id: i64,
    /// The new email address.
    pub email: String,
    /// Version the caller last observed; defaults to the loaded version.
    pub expected_version: Option<i64>,
}

/// Command to change a user's age.
#[derive(Debug, Clone)]
pub struct ChangeAge {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user identifier.
    pub user_id: i64,
    /// The new age.
    pub age: i32,
    /// Version the caller last observed; defaults to the loaded version.
    pub expected_version: Option<i64>,
}
