//! Projection documents built by folding events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::event::EventSummary;

/// Logical collections persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Idempotent event log, keyed by `source:id`.
    Events,
    /// Message lifecycle aggregates, keyed by `correlationId`.
    Messages,
    /// Document upload aggregates, keyed by `correlationId:fileId`.
    Documents,
    /// CRM case aggregates, keyed by `correlationId:caseId`.
    Crm,
    /// Payment aggregates, keyed by `correlationId`.
    Payments,
}

impl Collection {
    /// Every collection that holds projection documents.
    pub const PROJECTIONS: [Self; 4] = [Self::Messages, Self::Documents, Self::Crm, Self::Payments];

    /// Backing table / collection name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Messages => "messages",
            Self::Documents => "documents",
            Self::Crm => "crm",
            Self::Payments => "payments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Category-specific fields carried by a projection.
pub trait ProjectionFields:
    Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Overwrites every field that `incoming` carries a value for. Absent
    /// incoming values leave the current value untouched.
    fn overlay(&mut self, incoming: &Self);
}

/// A business-keyed aggregate document.
///
/// The timestamps are optional only so that a not-yet-persisted aggregate
/// can be represented; every stored document has all three set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection<F> {
    /// Business key.
    pub id: String,
    /// First write time. Set once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Time of the most recent successful write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Greatest event time applied so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<DateTime<Utc>>,
    /// Status derived from the newest event's type suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Audit trail in arrival order.
    #[serde(default)]
    pub events: Vec<EventSummary>,
    /// Category-specific fields.
    #[serde(flatten)]
    pub fields: F,
}

impl<F: ProjectionFields> Projection<F> {
    /// An empty aggregate for `id` that has never been written.
    #[must_use]
    pub fn seed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created: None,
            last_updated: None,
            last_event_time: None,
            status: None,
            events: Vec::new(),
            fields: F::default(),
        }
    }

    /// Returns `true` if an event with `key` is already in the audit trail.
    #[must_use]
    pub fn has_event(&self, key: &str) -> bool {
        self.events.iter().any(|e| e.key == key)
    }
}
