//! `PostgreSQL` implementations of the Jovey storage seams.
//!
//! `PgEventStore` owns the append-only `events` table. `PgProjectionStore`
//! drives the Database Manager's per-event transactions and writes the
//! current-state tables.

pub mod pg_event_store;
pub mod pg_projection_store;
mod rows;
pub mod schema;

use jovey_core::error::DomainError;

pub use pg_event_store::PgEventStore;
pub use pg_projection_store::{PgProjectionStore, PgProjectionUnit};

/// Embedded SQL migrations, applied at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

pub(crate) fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

/// Maps an error from a current-state statement. Data exceptions (SQLSTATE
/// class 22) and integrity constraint violations (class 23) are faults of
/// the row being written; everything else is the database's.
pub(crate) fn state_error(err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err
            .code()
            .is_some_and(|code| code.starts_with("22") || code.starts_with("23"))
    {
        return DomainError::ConstraintViolation(db_err.message().to_owned());
    }
    infrastructure(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_stay_infrastructure() {
        let err = state_error(sqlx::Error::PoolTimedOut);

        assert!(matches!(err, DomainError::Infrastructure(_)));
    }
}
