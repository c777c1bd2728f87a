//! Database pool setup.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::config::ServiceConfig;
use crate::error::AppError;

/// Connection options for `config`, with the statement time limit applied
/// to every session.
///
/// # Errors
///
/// Returns `AppError::Database` if `DATABASE_URL` is not a valid URL.
pub fn connect_options(config: &ServiceConfig) -> Result<PgConnectOptions, AppError> {
    let timeout_ms = config.statement_timeout.as_millis().to_string();
    Ok(PgConnectOptions::from_str(&config.database_url)?
        .options([("statement_timeout", timeout_ms.as_str())]))
}

/// Opens the pool and applies pending migrations.
///
/// # Errors
///
/// Returns `AppError` if the database is unreachable or a migration fails.
pub async fn connect(config: &ServiceConfig) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.statement_timeout)
        .connect_with(connect_options(config)?)
        .await?;

    fdm_event_store::schema::MIGRATOR.run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}
