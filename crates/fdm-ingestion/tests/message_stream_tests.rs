//! End-to-end ingestion scenarios: queue in, projections out.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use fdm_core::projection::Collection;
use fdm_ingestion::application::consumer::{ConsumeEvents, Consumer, ConsumerSettings};
use fdm_test_support::{FlakyStore, InMemoryQueue, InMemoryStore, SequenceClock};
use serde_json::{Value, json};

const CORRELATION_ID: &str = "1f2e3d4c-5b6a-4978-8a9b-0c1d2e3f4a5b";

const REQUEST_ID: &str = "2d9c7f4e-0a44-4e0b-9d54-3f7a1c2b8e01";
const SENDING_ID: &str = "2d9c7f4e-0a44-4e0b-9d54-3f7a1c2b8e02";
const DELIVERED_ID: &str = "2d9c7f4e-0a44-4e0b-9d54-3f7a1c2b8e03";

struct Harness {
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryStore>,
    consumer: Consumer,
}

impl Harness {
    fn new() -> Self {
        Self::with_failed_upserts(0)
    }

    /// Fails the first `failures` projection upserts with a timeout.
    fn with_failed_upserts(failures: usize) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryStore::new());
        let clock = SequenceClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            Duration::seconds(1),
        );
        let consumer = Consumer::new(
            queue.clone(),
            store.clone(),
            Arc::new(FlakyStore::new(store.clone(), failures)),
            Arc::new(clock),
            ConsumerSettings::default(),
        );
        Self {
            queue,
            store,
            consumer,
        }
    }

    /// Consumes until the queue is drained.
    async fn drain(&self) {
        while self.consumer.consume_once().await.unwrap() {}
    }

    fn message(&self) -> Value {
        self.store
            .document(Collection::Messages, CORRELATION_ID)
            .expect("message aggregate should exist")
    }
}

/// A notification event wrapped the way the topic relays it.
fn notification(id: &str, status: &str, minute: u32) -> String {
    let event = json!({
        "id": id,
        "source": "fcp-sfd-comms",
        "type": format!("uk.gov.fcp.sfd.notification.{status}"),
        "specversion": "1.0",
        "datacontenttype": "application/json",
        "time": format!("2026-01-15T10:{minute:02}:00.000Z"),
        "data": {
            "correlationId": CORRELATION_ID,
            "crn": 1_050_000_000,
            "sbi": 105_000_000,
            "recipient": "farmer@example.com"
        }
    });
    json!({ "Message": event.to_string() }).to_string()
}

fn event_types(doc: &Value) -> Vec<String> {
    doc["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap().trim_start_matches("uk.gov.fcp.sfd.notification.").to_owned())
        .collect()
}

#[tokio::test]
async fn test_ordered_stream_ends_delivered() {
    // Arrange
    let harness = Harness::new();
    harness.queue.push(notification(REQUEST_ID, "request", 0));
    harness.queue.push(notification(SENDING_ID, "sending", 1));
    harness.queue.push(notification(DELIVERED_ID, "delivered", 2));

    // Act
    harness.drain().await;

    // Assert
    let doc = harness.message();
    assert_eq!(doc["status"], "delivered");
    assert_eq!(event_types(&doc), vec!["request", "sending", "delivered"]);
    assert_eq!(doc["lastEventTime"], "2026-01-15T10:02:00Z");
    assert_eq!(harness.store.event_count(), 3);
    assert_eq!(harness.queue.pending_count(), 0);
}

#[tokio::test]
async fn test_duplicated_sending_is_recorded_once() {
    // Arrange
    let harness = Harness::new();
    harness.queue.push(notification(REQUEST_ID, "request", 0));
    harness.queue.push(notification(SENDING_ID, "sending", 1));
    harness.queue.push(notification(SENDING_ID, "sending", 1));
    harness.queue.push(notification(DELIVERED_ID, "delivered", 2));

    // Act
    harness.drain().await;

    // Assert
    let doc = harness.message();
    assert_eq!(harness.store.event_count(), 3);
    assert_eq!(doc["events"].as_array().unwrap().len(), 3);
    assert_eq!(doc["status"], "delivered");
    assert_eq!(harness.queue.deleted_ids().len(), 4);
}

#[tokio::test]
async fn test_late_sending_does_not_regress_status() {
    // Arrange
    let harness = Harness::new();
    harness.queue.push(notification(REQUEST_ID, "request", 0));
    harness.queue.push(notification(DELIVERED_ID, "delivered", 2));
    harness.queue.push(notification(SENDING_ID, "sending", 1));

    // Act
    harness.drain().await;

    // Assert
    let doc = harness.message();
    assert_eq!(doc["status"], "delivered");
    assert_eq!(doc["lastEventTime"], "2026-01-15T10:02:00Z");
    assert_eq!(event_types(&doc), vec!["request", "delivered", "sending"]);
}

#[tokio::test]
async fn test_created_is_fixed_by_the_first_write() {
    // Arrange
    let harness = Harness::new();
    harness.queue.push(notification(REQUEST_ID, "request", 0));
    harness.drain().await;
    let created = harness.message()["created"].clone();
    harness.queue.push(notification(DELIVERED_ID, "delivered", 2));

    // Act
    harness.drain().await;

    // Assert
    let doc = harness.message();
    assert_eq!(doc["created"], created);
    assert_ne!(doc["lastUpdated"], created);
}

#[tokio::test]
async fn test_one_invalid_message_does_not_affect_its_batch() {
    // Arrange
    let harness = Harness::new();
    harness.queue.push(notification(REQUEST_ID, "request", 0));
    let invalid = harness.queue.push(
        json!({
            "id": "3c4d5e6f-7a8b-4c9d-8e0f-1a2b3c4d5e6f",
            "source": "fcp-sfd-object-processor",
            "type": "uk.gov.fcp.sfd.document.uploaded",
            "specversion": "1.0",
            "data": { "correlationId": "c9", "crn": 1, "sbi": 2, "file": { "fileId": "f1" } }
        })
        .to_string(),
    );
    harness.queue.push(
        json!({
            "id": "4d5e6f7a-8b9c-4d0e-9f1a-2b3c4d5e6f7a",
            "source": "fcp-sfd-crm",
            "type": "uk.gov.fcp.sfd.crm.case.created",
            "specversion": "1.0",
            "time": "2026-01-15T10:05:00.000Z",
            "data": {
                "correlationId": CORRELATION_ID,
                "crn": 1_050_000_000,
                "sbi": 105_000_000,
                "caseId": "CASE-1",
                "caseType": "DOCUMENT_UPLOAD",
                "onlineSubmissionActivities": [{ "fileId": "f1" }]
            }
        })
        .to_string(),
    );
    harness.queue.push(
        json!({
            "id": "5e6f7a8b-9c0d-4e1f-8a2b-3c4d5e6f7a8b",
            "source": "ffc-pay-processing",
            "type": "uk.gov.defra.ffc.pay.payment.processed",
            "specversion": "1.0",
            "data": {
                "correlationId": "6f7a8b9c-0d1e-4f2a-9b3c-4d5e6f7a8b9c",
                "frn": 1_234_567_890,
                "schemeId": 2,
                "invoiceNumber": "S1234567"
            }
        })
        .to_string(),
    );

    // Act
    let had_work = harness.consumer.consume_once().await.unwrap();

    // Assert
    assert!(had_work);
    assert_eq!(harness.queue.deleted_ids().len(), 3);
    assert_eq!(harness.queue.in_flight_ids(), vec![invalid]);
    assert_eq!(harness.store.document_count(Collection::Messages), 1);
    assert_eq!(harness.store.document_count(Collection::Crm), 1);
    assert_eq!(harness.store.document_count(Collection::Payments), 1);
    assert_eq!(harness.store.document_count(Collection::Documents), 0);
    assert_eq!(harness.store.event_count(), 3);
}

#[tokio::test]
async fn test_redelivered_message_is_acknowledged_without_reapplying() {
    // Arrange
    let harness = Harness::new();
    harness.queue.push(notification(REQUEST_ID, "request", 0));
    harness.drain().await;
    let before = harness.message();
    harness.queue.push(notification(REQUEST_ID, "request", 0));

    // Act
    harness.drain().await;

    // Assert
    assert_eq!(harness.message(), before);
    assert_eq!(harness.store.event_count(), 1);
    assert_eq!(harness.queue.deleted_ids().len(), 2);
}

#[tokio::test]
async fn test_rejected_notification_is_acknowledged_but_not_stored() {
    // Arrange
    let harness = Harness::new();
    harness
        .queue
        .push(notification(REQUEST_ID, "failure.validation", 0));

    // Act
    harness.drain().await;

    // Assert
    assert_eq!(harness.queue.deleted_ids().len(), 1);
    assert_eq!(harness.store.event_count(), 0);
    assert_eq!(harness.store.document_count(Collection::Messages), 0);
}

#[tokio::test]
async fn test_redelivery_completes_a_merge_that_timed_out() {
    // Arrange
    let harness = Harness::with_failed_upserts(1);
    let id = harness.queue.push(notification(DELIVERED_ID, "delivered", 2));
    harness.consumer.consume_once().await.unwrap();
    let logged_after_failure = harness.store.event_count();
    let in_flight_after_failure = harness.queue.in_flight_ids();
    let doc_after_failure = harness.store.document(Collection::Messages, CORRELATION_ID);

    // Act
    harness.queue.expire_visibility();
    harness.drain().await;

    // Assert
    assert_eq!(logged_after_failure, 1);
    assert_eq!(in_flight_after_failure, vec![id.clone()]);
    assert!(doc_after_failure.is_none());
    let doc = harness.message();
    assert_eq!(doc["status"], "delivered");
    assert_eq!(event_types(&doc), vec!["delivered"]);
    assert_eq!(harness.store.event_count(), 1);
    assert_eq!(harness.queue.deleted_ids(), vec![id]);
    assert_eq!(harness.queue.pending_count(), 0);
}
