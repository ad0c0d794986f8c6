//! Clock abstraction used to stamp new events.

use chrono::{DateTime, Utc};

/// Source of `created_at` timestamps for newly recorded events.
///
/// Domain mutation methods take a `&dyn Clock` instead of calling
/// `Utc::now()` so that replays and tests stay deterministic.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
