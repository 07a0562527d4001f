//! Application layer for the Database Manager context.

pub mod command_handlers;
pub mod query_handlers;
