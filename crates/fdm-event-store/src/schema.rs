//! Store database schema.
//!
//! The DDL lives in the workspace `migrations/` directory and is embedded
//! here at compile time.

use fdm_core::projection::Collection;
use sqlx::migrate::Migrator;

/// Migrations creating the event log and every projection table.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Table backing `collection`.
#[must_use]
pub fn table_name(collection: Collection) -> &'static str {
    collection.name()
}

/// Every table that carries an `expires_at` column.
#[must_use]
pub fn expiring_tables() -> Vec<&'static str> {
    std::iter::once(Collection::Events)
        .chain(Collection::PROJECTIONS)
        .map(table_name)
        .collect()
}
