//! Application layer for the Event Store context.

pub mod command_handlers;
pub mod query_handlers;
