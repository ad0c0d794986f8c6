//! SimpleCQRS core: the event-sourcing substrate.
//!
//! This crate defines the aggregate state machine, the event and state
//! base model, the storage contract a persistence backend must fulfil, and
//! the repository that loads and saves aggregates under optimistic
//! concurrency. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod repository;
pub mod state;
pub mod storage;
