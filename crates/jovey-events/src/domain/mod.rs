//! Domain layer for the Event Store context.

pub mod commands;
pub mod validation;
