//! Shared test doubles and utilities for Jovey.

mod clock;
mod failing;
mod memory;
mod unit;

pub use clock::FixedClock;
pub use failing::FailingEventStore;
pub use memory::InMemoryEventStore;
pub use unit::StateTables;
