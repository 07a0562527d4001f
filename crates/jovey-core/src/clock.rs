//! Clock abstraction.
//!
//! Event insertion times and processing times are taken from a `Clock` so
//! that tests can pin them.

use chrono::{DateTime, Utc};

/// Source of wall-clock timestamps for `created_at` / `processed_at`.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
