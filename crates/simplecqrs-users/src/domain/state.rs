//! Materialized state of a user.

use serde::{Deserialize, Serialize};
use simplecqrs_core::state::{EntityState, StateMetadata};

/// Current state of a user, as stored in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity and version bookkeeping.
    pub metadata: StateMetadata<i64>,
    /// Display name.
    pub name: String,
    /// Contact email address.
    pub email: String,
    /// Age in years.
    pub age: i32,
}

impl EntityState for User {
    type Id = i64;
    const AGGREGATE_TYPE: &'static str = "user";

    fn new(id: i64) -> Self {
        Self {
            metadata: StateMetadata::new(id),
            name: String::new(),
            email: String::new(),
            age: 0,
        }
    }

    fn metadata(&self) -> &StateMetadata<i64> {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut StateMetadata<i64> {
        &mut self.metadata
    }
}
