//! Test stores: in-memory `EventLogRepository` and `ProjectionRepository`
//! implementations for tests.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fdm_core::error::StoreError;
use fdm_core::event::EventEntity;
use fdm_core::projection::Collection;
use fdm_core::query::ListQuery;
use fdm_core::repository::{EventLogRepository, ProjectionRepository, ProjectionTransform};

/// A store that keeps the event log and every projection collection in
/// memory. Each upsert runs under a single lock, which gives the same
/// per-key atomicity a real backend provides.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    events: Mutex<HashMap<String, EventEntity>>,
    projections: Mutex<HashMap<(Collection, String), serde_json::Value>>,
    upserts: Mutex<Vec<(Collection, String)>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the event log.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Snapshot of the document stored at `key`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn document(&self, collection: Collection, key: &str) -> Option<serde_json::Value> {
        self.projections
            .lock()
            .unwrap()
            .get(&(collection, key.to_owned()))
            .cloned()
    }

    /// Number of documents in `collection`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn document_count(&self, collection: Collection) -> usize {
        self.projections
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    /// Every `(collection, key)` passed to `upsert`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn upserts(&self) -> Vec<(Collection, String)> {
        self.upserts.lock().unwrap().clone()
    }
}

fn created_of(doc: &serde_json::Value) -> Option<DateTime<Utc>> {
    doc.get("created")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn matches_filter(doc: &serde_json::Value, field: &str, expected: Option<i64>) -> bool {
    expected.is_none_or(|value| doc.get(field).and_then(serde_json::Value::as_i64) == Some(value))
}

#[async_trait]
impl EventLogRepository for InMemoryStore {
    async fn insert_if_absent(&self, entity: &EventEntity) -> Result<bool, StoreError> {
        let mut events = self.events.lock().unwrap();
        if events.contains_key(&entity.key) {
            return Ok(false);
        }
        events.insert(entity.key.clone(), entity.clone());
        Ok(true)
    }

    async fn find_event(&self, key: &str) -> Result<Option<EventEntity>, StoreError> {
        Ok(self.events.lock().unwrap().get(key).cloned())
    }
}

#[async_trait]
impl ProjectionRepository for InMemoryStore {
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        transform: ProjectionTransform<'_>,
    ) -> Result<(), StoreError> {
        let mut projections = self.projections.lock().unwrap();
        let map_key = (collection, key.to_owned());
        let next = transform(projections.get(&map_key).cloned())?;
        projections.insert(map_key.clone(), next);
        self.upserts.lock().unwrap().push(map_key);
        Ok(())
    }

    async fn find(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.document(collection, key))
    }

    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let projections = self.projections.lock().unwrap();
        let mut docs: Vec<(String, serde_json::Value)> = projections
            .iter()
            .filter(|((c, _), doc)| {
                *c == collection
                    && matches_filter(doc, "crn", query.crn)
                    && matches_filter(doc, "sbi", query.sbi)
            })
            .map(|((_, key), doc)| (key.clone(), doc.clone()))
            .collect();
        docs.sort_by_key(|(key, doc)| Reverse((created_of(doc), key.clone())));

        let skip = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(query.page_size).unwrap_or(usize::MAX);
        Ok(docs
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(_, doc)| doc)
            .collect())
    }
}

/// A store whose every operation fails. Useful for testing error-handling
/// paths.
#[derive(Debug, Clone, Copy)]
pub struct FailingStore {
    timeout: bool,
}

impl FailingStore {
    /// Fails with `StoreError::Infrastructure`.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { timeout: false }
    }

    /// Fails with `StoreError::Timeout`.
    #[must_use]
    pub fn timing_out() -> Self {
        Self { timeout: true }
    }

    fn error(self) -> StoreError {
        if self.timeout {
            StoreError::Timeout("operation exceeded time limit".into())
        } else {
            StoreError::Infrastructure("connection refused".into())
        }
    }
}

#[async_trait]
impl EventLogRepository for FailingStore {
    async fn insert_if_absent(&self, _entity: &EventEntity) -> Result<bool, StoreError> {
        Err(self.error())
    }

    async fn find_event(&self, _key: &str) -> Result<Option<EventEntity>, StoreError> {
        Err(self.error())
    }
}

#[async_trait]
impl ProjectionRepository for FailingStore {
    async fn upsert(
        &self,
        _collection: Collection,
        _key: &str,
        _transform: ProjectionTransform<'_>,
    ) -> Result<(), StoreError> {
        Err(self.error())
    }

    async fn find(
        &self,
        _collection: Collection,
        _key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Err(self.error())
    }

    async fn list(
        &self,
        _collection: Collection,
        _query: &ListQuery,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        Err(self.error())
    }
}

/// Projections backed by an `InMemoryStore` whose first `failures` upserts
/// time out. Reads always reach the inner store.
#[derive(Debug)]
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    failures: AtomicUsize,
}

impl FlakyStore {
    /// Wraps `inner`, failing the next `failures` upserts.
    #[must_use]
    pub fn new(inner: Arc<InMemoryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ProjectionRepository for FlakyStore {
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        transform: ProjectionTransform<'_>,
    ) -> Result<(), StoreError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Timeout(format!("upsert of {collection}:{key}")));
        }
        self.inner.upsert(collection, key, transform).await
    }

    async fn find(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.find(collection, key).await
    }

    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        self.inner.list(collection, query).await
    }
}
