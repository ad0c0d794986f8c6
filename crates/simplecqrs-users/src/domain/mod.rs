//! Domain layer: state, events, aggregate and commands.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod state;
