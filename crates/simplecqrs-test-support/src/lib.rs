//! Shared test storages, clocks and fixtures for SimpleCQRS.

mod clock;
mod fixture;
mod storage;

pub use clock::{FixedClock, fixed_now};
pub use fixture::{TestAggregate, TestEvent, TestState, recorded_event};
pub use storage::{EmptyStorage, FailingStorage, RecordingStorage, StorageCall};
