//! `PostgreSQL` implementation of the `ProjectionRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use fdm_core::error::StoreError;
use fdm_core::projection::Collection;
use fdm_core::query::ListQuery;
use fdm_core::repository::{ProjectionRepository, ProjectionTransform};

use crate::error::map_sqlx_error;
use crate::schema::table_name;

/// How many times an upsert retries after losing a first-insert race.
const MAX_UPSERT_ATTEMPTS: u32 = 3;

/// Columns copied out of a projection document on every write.
struct IndexedColumns {
    crn: Option<i64>,
    sbi: Option<i64>,
    created: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

fn timestamp(document: &serde_json::Value, field: &str) -> Option<DateTime<Utc>> {
    document
        .get(field)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

impl IndexedColumns {
    fn from_document(document: &serde_json::Value) -> Self {
        Self {
            crn: document.get("crn").and_then(serde_json::Value::as_i64),
            sbi: document.get("sbi").and_then(serde_json::Value::as_i64),
            created: timestamp(document, "created"),
            last_updated: timestamp(document, "lastUpdated"),
        }
    }
}

/// PostgreSQL-backed projection documents, one table per collection.
///
/// `upsert` locks the row with `SELECT ... FOR UPDATE` inside a transaction,
/// so concurrent writers on one key queue behind each other. When two
/// writers race to create the same key, the loser's insert affects no rows;
/// it rolls back and retries against the winner's row.
#[derive(Debug, Clone)]
pub struct PgProjectionRepository {
    pool: PgPool,
    ttl: Option<Duration>,
}

impl PgProjectionRepository {
    /// Creates a new `PgProjectionRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, ttl: None }
    }

    /// Sets the retention period stamped on every write, counted from the
    /// document's `lastUpdated`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// One read-transform-write attempt. Returns `false` if a concurrent
    /// writer created the row first.
    async fn try_upsert(
        &self,
        table: &str,
        key: &str,
        transform: ProjectionTransform<'_>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let current: Option<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT document FROM {table} WHERE id = $1 FOR UPDATE"))
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let exists = current.is_some();

        let next = transform(current)?;
        let columns = IndexedColumns::from_document(&next);
        let expires_at = self
            .ttl
            .map(|ttl| columns.last_updated.unwrap_or_else(Utc::now) + ttl);

        if exists {
            sqlx::query(&format!(
                "UPDATE {table}
                 SET document = $2, crn = $3, sbi = $4,
                     last_updated = COALESCE($5, now()), expires_at = $6
                 WHERE id = $1"
            ))
            .bind(key)
            .bind(&next)
            .bind(columns.crn)
            .bind(columns.sbi)
            .bind(columns.last_updated)
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        } else {
            let inserted = sqlx::query(&format!(
                "INSERT INTO {table} (id, document, crn, sbi, created, last_updated, expires_at)
                 VALUES ($1, $2, $3, $4, COALESCE($5, now()), COALESCE($6, now()), $7)
                 ON CONFLICT (id) DO NOTHING"
            ))
            .bind(key)
            .bind(&next)
            .bind(columns.crn)
            .bind(columns.sbi)
            .bind(columns.created)
            .bind(columns.last_updated)
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if inserted.rows_affected() == 0 {
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Ok(false);
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }
}

#[async_trait]
impl ProjectionRepository for PgProjectionRepository {
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        transform: ProjectionTransform<'_>,
    ) -> Result<(), StoreError> {
        let table = table_name(collection);
        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            if self.try_upsert(table, key, transform).await? {
                return Ok(());
            }
            tracing::debug!(%collection, key, attempt, "lost insert race, retrying");
        }
        Err(StoreError::Conflict(format!("{collection}:{key}")))
    }

    async fn find(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let table = table_name(collection);
        sqlx::query_scalar(&format!("SELECT document FROM {table} WHERE id = $1"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let table = table_name(collection);
        let limit = i64::from(query.page_size);
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        sqlx::query_scalar(&format!(
            "SELECT document FROM {table}
             WHERE ($1::BIGINT IS NULL OR crn = $1)
               AND ($2::BIGINT IS NULL OR sbi = $2)
             ORDER BY created DESC, id DESC
             LIMIT $3 OFFSET $4"
        ))
        .bind(query.crn)
        .bind(query.sbi)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}
