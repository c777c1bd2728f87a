//! Repository abstractions for the event log and projection collections.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::event::EventEntity;
use crate::projection::Collection;
use crate::query::ListQuery;

/// Transformation applied to a projection document inside an atomic upsert.
///
/// Receives the current document (`None` if the key has never been
/// written) and returns the replacement.
pub type ProjectionTransform<'a> =
    &'a (dyn Fn(Option<serde_json::Value>) -> Result<serde_json::Value, StoreError> + Send + Sync);

/// Idempotent, append-only log of every event received.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    /// Inserts `entity` unless an entry with the same key exists.
    ///
    /// Returns `true` when the entry was written and `false` when the key
    /// was already present. An existing entry is never modified.
    async fn insert_if_absent(&self, entity: &EventEntity) -> Result<bool, StoreError>;

    /// Loads a logged event by its `source:id` key.
    async fn find_event(&self, key: &str) -> Result<Option<EventEntity>, StoreError>;
}

/// Keyed projection documents.
#[async_trait]
pub trait ProjectionRepository: Send + Sync {
    /// Atomically reads the document at `key`, applies `transform` and
    /// writes the result. Concurrent upserts on the same key are serialized
    /// by the store; no intermediate state is observable.
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        transform: ProjectionTransform<'_>,
    ) -> Result<(), StoreError>;

    /// Loads the document at `key`.
    async fn find(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Lists documents matching `query`, newest `created` first.
    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<serde_json::Value>, StoreError>;
}
