//! Jovey Core: shared domain abstractions.
//!
//! This crate defines the event log types and the storage seams that the
//! Event Store and the Database Manager depend on. It contains no
//! infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod projection;
pub mod repository;
pub mod state;
