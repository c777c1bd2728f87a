//! `PostgreSQL` implementation of the `EventLogRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use fdm_core::error::StoreError;
use fdm_core::event::EventEntity;
use fdm_core::repository::EventLogRepository;

use crate::error::map_sqlx_error;

/// PostgreSQL-backed event log.
///
/// Entries are written with `INSERT ... ON CONFLICT DO NOTHING`, so an
/// existing entry is never touched and a duplicate shows up as zero rows
/// affected.
#[derive(Debug, Clone)]
pub struct PgEventLogRepository {
    pool: PgPool,
    ttl: Option<Duration>,
}

impl PgEventLogRepository {
    /// Creates a new `PgEventLogRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, ttl: None }
    }

    /// Sets the retention period stamped on every new entry.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn expires_at(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| from + ttl)
    }
}

#[async_trait]
impl EventLogRepository for PgEventLogRepository {
    async fn insert_if_absent(&self, entity: &EventEntity) -> Result<bool, StoreError> {
        let document = serde_json::to_value(entity)
            .map_err(|e| StoreError::Serialization(format!("event {}: {e}", entity.key)))?;

        let result = sqlx::query(
            r"
            INSERT INTO events (key, id, source, type, time, received, document, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key) DO NOTHING
            ",
        )
        .bind(&entity.key)
        .bind(&entity.event.id)
        .bind(&entity.event.source)
        .bind(&entity.event.event_type)
        .bind(entity.event.time)
        .bind(entity.received)
        .bind(&document)
        .bind(self.expires_at(entity.received))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_event(&self, key: &str) -> Result<Option<EventEntity>, StoreError> {
        let document: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT document FROM events WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        document
            .map(|doc| {
                serde_json::from_value(doc)
                    .map_err(|e| StoreError::Serialization(format!("event {key}: {e}")))
            })
            .transpose()
    }
}
