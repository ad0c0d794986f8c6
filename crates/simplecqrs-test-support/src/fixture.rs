//! A minimal aggregate used by tests that exercise the generic machinery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simplecqrs_core::aggregate::{AggregateCore, AggregateRoot};
use simplecqrs_core::event::{DomainEvent, EventMetadata};
use simplecqrs_core::state::{EntityState, StateMetadata};
use uuid::Uuid;

/// State of the test aggregate: the name carried by the last applied event
/// plus a count of applied events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestState {
    /// Bookkeeping fields.
    pub metadata: StateMetadata<i64>,
    /// Name from the most recently applied event.
    pub name: String,
    /// Number of events folded into this state.
    pub counter: i64,
}

impl EntityState for TestState {
    type Id = i64;
    const AGGREGATE_TYPE: &'static str = "test";

    fn new(id: i64) -> Self {
        Self {
            metadata: StateMetadata::new(id),
            name: String::new(),
            counter: 0,
        }
    }

    fn metadata(&self) -> &StateMetadata<i64> {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut StateMetadata<i64> {
        &mut self.metadata
    }
}

/// The single event type of the test aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Free-form payload used to check delivery order.
    pub name: String,
}

impl TestEvent {
    /// A new, unrecorded event.
    #[must_use]
    pub fn new(name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            metadata: EventMetadata::new(Uuid::new_v4(), created_at),
            name: name.to_owned(),
        }
    }
}

impl DomainEvent for TestEvent {
    fn event_type(&self) -> &'static str {
        "test.recorded"
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EventMetadata {
        &mut self.metadata
    }
}

/// An already-recorded event, as a storage backend would hand it back.
#[must_use]
pub fn recorded_event(sequence_number: i64, name: &str, created_at: DateTime<Utc>) -> TestEvent {
    TestEvent {
        metadata: EventMetadata::recorded(
            Uuid::new_v4(),
            sequence_number,
            Uuid::nil(),
            created_at,
        ),
        name: name.to_owned(),
    }
}

/// Test aggregate that counts how many events its `apply` has seen.
#[derive(Debug)]
pub struct TestAggregate {
    core: AggregateCore<TestState, TestEvent>,
    /// Number of `apply` calls since construction.
    pub applied: usize,
}

impl TestAggregate {
    /// Records a new event carrying `name`.
    pub fn record(&mut self, name: &str, created_at: DateTime<Utc>) {
        self.record_change(TestEvent::new(name, created_at));
    }
}

impl AggregateRoot for TestAggregate {
    type State = TestState;
    type Event = TestEvent;

    fn from_core(core: AggregateCore<TestState, TestEvent>) -> Self {
        Self { core, applied: 0 }
    }

    fn core(&self) -> &AggregateCore<TestState, TestEvent> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore<TestState, TestEvent> {
        &mut self.core
    }

    fn apply(&mut self, event: &TestEvent) {
        let state = self.core.state_mut();
        state.name.clone_from(&event.name);
        state.counter += 1;
        self.applied += 1;
    }
}
