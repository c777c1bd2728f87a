//! CloudEvent envelope and its stored forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated CloudEvents v1.0 envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Producer-assigned identifier, unique per `source`.
    pub id: String,
    /// Producer identifier.
    pub source: String,
    /// Dot-delimited type encoding category and lifecycle status.
    #[serde(rename = "type")]
    pub event_type: String,
    /// CloudEvents specification version.
    pub specversion: String,
    /// Media type of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// When the occurrence happened, according to the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Subject of the event in the context of the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Category-specific payload.
    pub data: serde_json::Value,
}

impl CloudEvent {
    /// Composite idempotency key, `source:id`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }
}

/// An event as written to the idempotent event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntity {
    /// Composite key, `source:id`.
    pub key: String,
    /// The logged envelope.
    #[serde(flatten)]
    pub event: CloudEvent,
    /// Ingestion timestamp assigned when the entry was written.
    pub received: DateTime<Utc>,
}

impl EventEntity {
    /// Builds the log entry for `event` received at `received`.
    #[must_use]
    pub fn new(event: &CloudEvent, received: DateTime<Utc>) -> Self {
        Self {
            key: event.key(),
            event: event.clone(),
            received,
        }
    }

    /// The event time, falling back to the ingestion time when the producer
    /// supplied none.
    #[must_use]
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.event.time.unwrap_or(self.received)
    }

    /// Audit summary retained inside aggregates.
    #[must_use]
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            key: self.key.clone(),
            id: self.event.id.clone(),
            event_type: self.event.event_type.clone(),
            source: self.event.source.clone(),
            time: self.event.time,
            subject: self.event.subject.clone(),
            received: self.received,
        }
    }
}

/// Audit entry kept in a projection's `events` array. Never carries `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Composite key, `source:id`.
    pub key: String,
    /// Producer-assigned identifier.
    pub id: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Producer identifier.
    pub source: String,
    /// Producer event time, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Event subject, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Ingestion timestamp.
    pub received: DateTime<Utc>,
}
