//! SimpleCQRS user-management sample.
//!
//! A small bounded context built on the core: a `User` aggregate whose name,
//! email and age change through events, plus the command and query handlers
//! the HTTP API calls.

pub mod application;
pub mod domain;
