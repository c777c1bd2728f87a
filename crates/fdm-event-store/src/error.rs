//! Mapping from `sqlx` errors to `StoreError`.

use fdm_core::error::StoreError;

/// SQLSTATE raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";

/// Classifies a `sqlx` error, keeping time limit failures distinct.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(e.to_string()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            StoreError::Timeout(e.to_string())
        }
        _ => StoreError::Infrastructure(e.to_string()),
    }
}
