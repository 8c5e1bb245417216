//! Maps sqlx / PostgreSQL errors onto store error kinds.
//!
//! See <https://www.postgresql.org/docs/current/errcodes-appendix.html> for
//! the SQLSTATE classes.

use stratus_core::error::{AppError, StoreErrorKind};

/// Returns the store error kind for a PostgreSQL SQLSTATE code.
///
/// ```
/// use stratus_core::StoreErrorKind;
/// use stratus_db::kind_for_sqlstate;
///
/// assert_eq!(kind_for_sqlstate("40001"), StoreErrorKind::Aborted);
/// assert_eq!(kind_for_sqlstate("53300"), StoreErrorKind::ResourceExhausted);
/// ```
pub fn kind_for_sqlstate(code: &str) -> StoreErrorKind {
    match code {
        // serialization_failure, deadlock_detected
        "40001" | "40P01" => StoreErrorKind::Aborted,
        // query_canceled (statement_timeout)
        "57014" => StoreErrorKind::DeadlineExceeded,
        // admin_shutdown, crash_shutdown, cannot_connect_now
        "57P01" | "57P02" | "57P03" => StoreErrorKind::Unavailable,
        "42501" => StoreErrorKind::PermissionDenied,
        // undefined_table, invalid_catalog_name
        "42P01" | "3D000" => StoreErrorKind::NotFound,
        _ => match code.get(..2) {
            Some("53") => StoreErrorKind::ResourceExhausted,
            Some("08") => StoreErrorKind::Unavailable,
            Some("22") | Some("23") => StoreErrorKind::InvalidArgument,
            _ => StoreErrorKind::Internal,
        },
    }
}

/// Converts a sqlx error into a classified [`AppError::Store`].
pub fn store_error(err: sqlx::Error) -> AppError {
    let kind = match &err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| kind_for_sqlstate(&code))
            .unwrap_or(StoreErrorKind::Internal),
        sqlx::Error::PoolTimedOut => StoreErrorKind::DeadlineExceeded,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed => StoreErrorKind::Unavailable,
        _ => StoreErrorKind::Internal,
    };
    AppError::store(kind, err.to_string())
}
