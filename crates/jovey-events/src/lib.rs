//! Jovey: Event Store bounded context.
//!
//! Responsible for accepting domain facts into the append-only log
//! (validation, attribution, idempotency) and for the read side over it:
//! filtered queries, aggregate history, the type catalog and log counts.

pub mod application;
pub mod domain;
