//! Domain layer for the Database Manager context.

pub mod commands;
pub mod dispatch;
pub mod handlers;
