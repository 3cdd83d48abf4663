//! Mapping of sqlx errors onto [`StoreError`].
//!
//! Classification uses SQLSTATE codes only. Message text varies across server
//! versions and locales.

use enrollment_core::StoreError;

/// `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";
/// `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// `lock_not_available`, raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `unique_violation`, a lost insert race
const UNIQUE_VIOLATION: &str = "23505";

/// Metric name for conflicts seen by the backend, labelled by SQLSTATE.
pub const CONFLICTS_TOTAL: &str = "enrollment_postgres_conflicts_total";

/// Whether a SQLSTATE denotes transient contention.
#[must_use]
pub fn is_transient_sqlstate(code: &str) -> bool {
    matches!(
        code,
        SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE | UNIQUE_VIOLATION
    )
}

/// Classify a sqlx error.
///
/// - contention SQLSTATEs and pool acquire timeouts become [`StoreError::Conflict`]
/// - decode failures become [`StoreError::Corrupt`]
/// - everything else becomes [`StoreError::Backend`]
pub(crate) fn classify(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) if is_transient_sqlstate(&code) => {
                metrics::counter!(CONFLICTS_TOTAL, "sqlstate" => code.to_string()).increment(1);
                StoreError::Conflict(format!("{} (SQLSTATE {code})", db.message()))
            }
            _ => StoreError::Backend(error.to_string()),
        },
        sqlx::Error::PoolTimedOut => {
            metrics::counter!(CONFLICTS_TOTAL, "sqlstate" => "pool_timeout").increment(1);
            StoreError::Conflict(error.to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_) => StoreError::Corrupt(error.to_string()),
        _ => StoreError::Backend(error.to_string()),
    }
}
