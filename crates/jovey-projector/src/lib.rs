//! Jovey: Database Manager bounded context.
//!
//! Replays unprocessed events from the log into the current-state tables.
//! Every event is applied in its own unit of work: the handler's writes and
//! the "processed" mark commit together or not at all.

pub mod application;
pub mod domain;
pub mod error;
