//! SimpleCQRS HTTP API.
//!
//! Exposes the user-management sample over HTTP. The binary in `main.rs`
//! wires configuration, tracing and the storage backend; everything else
//! lives here so integration tests can build the same router.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
