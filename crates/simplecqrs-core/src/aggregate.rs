//! Aggregate root abstraction.
//!
//! An aggregate owns exactly one [`EntityState`] value, mutates it only by
//! applying events, and buffers the events it records until a repository
//! persists them. Concrete aggregates wrap an [`AggregateCore`] and implement
//! [`AggregateRoot::apply`]; everything else is provided by the trait.

use std::collections::VecDeque;
use std::collections::vec_deque;

use chrono::{DateTime, Utc};

use crate::event::DomainEvent;
use crate::state::EntityState;

/// The generic part of every aggregate: owned state, pending events and the
/// version observed at construction.
#[derive(Debug)]
pub struct AggregateCore<S, E> {
    state: S,
    pending: VecDeque<E>,
    original_version: i64,
}

impl<S, E> AggregateCore<S, E>
where
    S: EntityState,
    E: DomainEvent,
{
    /// Wraps a copy of `initial_state`. The caller keeps its own value; later
    /// mutations of the aggregate never show through it.
    #[must_use]
    pub fn new(initial_state: &S) -> Self {
        Self {
            state: initial_state.clone(),
            pending: VecDeque::new(),
            original_version: initial_state.version(),
        }
    }

    /// Read access to the owned state.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable access to the owned state, for `AggregateRoot::apply`
    /// implementations. Version bookkeeping stays out of reach.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Version captured when the aggregate was constructed.
    #[must_use]
    pub fn original_version(&self) -> i64 {
        self.original_version
    }

    fn advance(&mut self, event: &E) {
        self.state
            .metadata_mut()
            .advance(event.sequence_number(), event.created_at());
    }
}

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized {
    /// Materialized state owned by the aggregate.
    type State: EntityState;

    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Builds the concrete aggregate around a prepared core.
    fn from_core(core: AggregateCore<Self::State, Self::Event>) -> Self;

    /// Returns the wrapped core.
    fn core(&self) -> &AggregateCore<Self::State, Self::Event>;

    /// Returns the wrapped core mutably.
    fn core_mut(&mut self) -> &mut AggregateCore<Self::State, Self::Event>;

    /// Apply an event's payload to the domain fields of the owned state.
    ///
    /// Implementations match exhaustively on the event kind. Version and
    /// `last_modified` are updated by the caller afterwards; implementations
    /// must not touch them.
    fn apply(&mut self, event: &Self::Event);

    /// Construct an aggregate from a copy of `initial_state`. No validation
    /// is performed.
    fn new(initial_state: &Self::State) -> Self {
        Self::from_core(AggregateCore::new(initial_state))
    }

    /// Returns the aggregate identifier.
    fn id(&self) -> &<Self::State as EntityState>::Id {
        self.core().state().id()
    }

    /// Returns the current version (sequence number of the last applied event).
    fn version(&self) -> i64 {
        self.core().state().version()
    }

    /// Returns the version of the snapshot this aggregate was loaded from.
    fn latest_snapshot_version(&self) -> i64 {
        self.core().state().latest_snapshot_version()
    }

    /// Returns the creation time of the last applied event.
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.core().state().metadata().last_modified()
    }

    /// Returns the version the aggregate had when it was constructed. It does
    /// not move when new events are recorded.
    fn original_version(&self) -> i64 {
        self.core().original_version()
    }

    /// Read access to the owned state.
    fn state(&self) -> &Self::State {
        self.core().state()
    }

    /// Records a new event: assigns the next sequence number, applies it and
    /// appends it to the pending queue. The only way new events come to be.
    ///
    /// `event` must be built with `EventMetadata::new`. An event that already
    /// carries a sequence number is ignored and logged; it is never
    /// renumbered.
    fn record_change(&mut self, mut event: Self::Event) {
        let next = self.version() + 1;
        if !event.metadata_mut().assign_sequence_number(next) {
            tracing::warn!(
                aggregate_id = %self.id(),
                sequence_number = event.sequence_number(),
                "ignoring event that was already recorded"
            );
            return;
        }
        apply_change(self, &event);
        self.core_mut().pending.push_back(event);
    }

    /// Replays stored history on top of the current state.
    ///
    /// Events are sorted by sequence number and any event at or below the
    /// current version is skipped, so duplicates and events already covered by
    /// a snapshot are harmless. Replayed events never enter the pending queue.
    /// Returns the number of events applied.
    fn load_from_history<I>(&mut self, history: I) -> usize
    where
        I: IntoIterator<Item = Self::Event>,
    {
        let mut history: Vec<Self::Event> = history.into_iter().collect();
        history.sort_by_key(DomainEvent::sequence_number);

        let mut applied = 0;
        for event in &history {
            let sequence_number = event.sequence_number();
            if sequence_number <= self.version() {
                continue;
            }
            if sequence_number != self.version() + 1 {
                tracing::warn!(
                    aggregate_id = %self.id(),
                    version = self.version(),
                    sequence_number,
                    "gap in replayed event history"
                );
            }
            apply_change(self, event);
            applied += 1;
        }
        applied
    }

    /// Whether recorded events are waiting to be persisted.
    fn has_pending_changes(&self) -> bool {
        !self.core().pending.is_empty()
    }

    /// Removes and returns the oldest pending event.
    fn take_next_pending_change(&mut self) -> Option<Self::Event> {
        self.core_mut().pending.pop_front()
    }

    /// Pending events, oldest first, without removing them.
    fn pending_changes(&self) -> vec_deque::Iter<'_, Self::Event> {
        self.core().pending.iter()
    }

    /// Returns an independent copy of the owned state.
    fn snapshot(&self) -> Self::State {
        self.core().state().clone()
    }
}

fn apply_change<A: AggregateRoot>(aggregate: &mut A, event: &A::Event) {
    aggregate.apply(event);
    aggregate.core_mut().advance(event);
}
