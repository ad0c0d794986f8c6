//! SimpleCQRS storage backends.
//!
//! Two implementations of the core `Storage` contract: an in-process store
//! for tests and single-node deployments, and a PostgreSQL store built on
//! `sqlx`.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
