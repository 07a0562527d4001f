//! Deterministic `Clock` implementation for tests.

use chrono::{DateTime, TimeZone, Utc};
use jovey_core::clock::Clock;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock pinned to 2025-01-15 12:00:00 UTC.
    #[must_use]
    pub fn noon() -> Self {
        Self(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
