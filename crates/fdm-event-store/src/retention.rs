//! TTL-based retention.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use fdm_core::error::StoreError;

use crate::error::map_sqlx_error;
use crate::schema::expiring_tables;

/// Deletes every event log entry and projection whose `expires_at` is at or
/// before `now`. Returns the number of rows removed.
///
/// # Errors
///
/// Returns `StoreError` if a delete fails.
pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let mut removed = 0;
    for table in expiring_tables() {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE expires_at IS NOT NULL AND expires_at <= $1"
        ))
        .bind(now)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            tracing::info!(table, removed = result.rows_affected(), "purged expired rows");
        }
        removed += result.rows_affected();
    }
    Ok(removed)
}
