//! Projection merge engine.
//!
//! A merge is an ordered list of pure stages, each taking the aggregate and
//! the incoming event and returning the next aggregate. `Pipeline::run`
//! folds the stages over the stored document inside a single atomic
//! repository upsert, so the read, the merge and the write are never
//! interleaved with another writer on the same key.

use chrono::{DateTime, Utc};
use fdm_core::error::StoreError;
use fdm_core::event::{EventEntity, EventSummary};
use fdm_core::projection::{Collection, Projection, ProjectionFields};
use fdm_core::repository::ProjectionRepository;

use crate::domain::category::status_from_type;

/// Per-category merge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveConfig {
    /// Collection holding the aggregate.
    pub collection: Collection,
    /// Prefix stripped from the event type to derive the status.
    pub type_prefix: &'static str,
    /// Apply data fields only when the event is newer than the aggregate.
    pub update_only_when_newer: bool,
    /// Leave the `events` audit trail untouched.
    pub skip_event_tracking: bool,
    /// Leave `status` and `lastEventTime` untouched.
    pub skip_status_tracking: bool,
}

impl SaveConfig {
    /// Settings with every stage enabled and unconditional field overwrite.
    #[must_use]
    pub fn new(collection: Collection, type_prefix: &'static str) -> Self {
        Self {
            collection,
            type_prefix,
            update_only_when_newer: false,
            skip_event_tracking: false,
            skip_status_tracking: false,
        }
    }

    /// Enables latest-wins gating of data fields.
    #[must_use]
    pub fn latest_wins(mut self) -> Self {
        self.update_only_when_newer = true;
        self
    }
}

/// Everything a stage needs to know about the incoming event.
#[derive(Debug, Clone)]
pub struct MergeInput<F> {
    /// Business key of the aggregate.
    pub key: String,
    /// Fields extracted from the event payload.
    pub fields: F,
    /// Audit entry for the event.
    pub summary: EventSummary,
    /// Full event type, used for status derivation.
    pub event_type: String,
    /// Event time, falling back to the ingestion time.
    pub incoming_time: DateTime<Utc>,
    /// Ingestion time.
    pub received: DateTime<Utc>,
}

impl<F> MergeInput<F> {
    /// Builds the merge input for a freshly logged event.
    #[must_use]
    pub fn new(key: String, fields: F, entity: &EventEntity) -> Self {
        Self {
            key,
            fields,
            summary: entity.summary(),
            event_type: entity.event.event_type.clone(),
            incoming_time: entity.effective_time(),
            received: entity.received,
        }
    }
}

/// A single merge step.
pub type Stage<F> = fn(Projection<F>, &MergeInput<F>) -> Projection<F>;

/// `lastEventTime` of an aggregate, with the epoch standing in for never.
fn previous_event_time<F>(projection: &Projection<F>) -> DateTime<Utc> {
    projection.last_event_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn set_timestamps<F>(mut projection: Projection<F>, input: &MergeInput<F>) -> Projection<F> {
    projection.last_updated = Some(input.received);
    projection.created.get_or_insert(input.received);
    projection
}

fn overlay_fields<F: ProjectionFields>(
    mut projection: Projection<F>,
    input: &MergeInput<F>,
) -> Projection<F> {
    projection.fields.overlay(&input.fields);
    projection
}

fn overlay_fields_when_newer<F: ProjectionFields>(
    projection: Projection<F>,
    input: &MergeInput<F>,
) -> Projection<F> {
    if input.incoming_time > previous_event_time(&projection) {
        overlay_fields(projection, input)
    } else {
        projection
    }
}

fn append_event<F>(mut projection: Projection<F>, input: &MergeInput<F>) -> Projection<F> {
    if !projection.events.iter().any(|e| e.key == input.summary.key) {
        projection.events.push(input.summary.clone());
    }
    projection
}

/// Builds the status stage for `type_prefix`.
///
/// Status follows the newest event by event time. `lastEventTime` only ever
/// moves forward.
fn track_status<F>(
    type_prefix: &'static str,
) -> impl Fn(Projection<F>, &MergeInput<F>) -> Projection<F> {
    move |mut projection, input| {
        let previous = previous_event_time(&projection);
        if input.incoming_time > previous {
            if let Some(status) = status_from_type(&input.event_type, type_prefix) {
                projection.status = Some(status);
            }
        }
        projection.last_event_time = Some(
            projection
                .last_event_time
                .map_or(input.incoming_time, |t| t.max(input.incoming_time)),
        );
        projection
    }
}

/// A boxed stage. Needed for the status stage, which captures its prefix.
type BoxedStage<F> = Box<dyn Fn(Projection<F>, &MergeInput<F>) -> Projection<F> + Send + Sync>;

/// Assembles the stage list for one category.
pub struct PipelineBuilder<F> {
    config: SaveConfig,
    extra: Vec<Stage<F>>,
}

impl<F: ProjectionFields> PipelineBuilder<F> {
    #[must_use]
    pub fn new(config: SaveConfig) -> Self {
        Self {
            config,
            extra: Vec::new(),
        }
    }

    /// Appends a category-specific stage, run after the common ones.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage<F>) -> Self {
        self.extra.push(stage);
        self
    }

    /// Produces the pipeline. Stage order: timestamps, fields, events,
    /// status, then any extra stages.
    #[must_use]
    pub fn build(self) -> Pipeline<F> {
        let mut stages: Vec<BoxedStage<F>> = vec![Box::new(set_timestamps::<F>)];

        if self.config.update_only_when_newer {
            stages.push(Box::new(overlay_fields_when_newer::<F>));
        } else {
            stages.push(Box::new(overlay_fields::<F>));
        }
        if !self.config.skip_event_tracking {
            stages.push(Box::new(append_event::<F>));
        }
        if !self.config.skip_status_tracking {
            stages.push(Box::new(track_status::<F>(self.config.type_prefix)));
        }
        for stage in self.extra {
            stages.push(Box::new(stage));
        }

        Pipeline {
            config: self.config,
            stages,
        }
    }
}

/// An assembled merge for one category.
pub struct Pipeline<F> {
    config: SaveConfig,
    stages: Vec<BoxedStage<F>>,
}

impl<F: ProjectionFields> Pipeline<F> {
    /// The settings this pipeline was built from.
    #[must_use]
    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    /// Folds every stage over `current`.
    #[must_use]
    pub fn merge(&self, current: Projection<F>, input: &MergeInput<F>) -> Projection<F> {
        self.stages
            .iter()
            .fold(current, |projection, stage| stage(projection, input))
    }

    /// Merges `input` into the stored document, if any, and returns the
    /// replacement document. A document whose audit trail already holds the
    /// event is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the stored document does not
    /// decode as this category's projection.
    pub fn apply(
        &self,
        current: Option<serde_json::Value>,
        input: &MergeInput<F>,
    ) -> Result<serde_json::Value, StoreError> {
        let projection = match current {
            Some(doc) => serde_json::from_value::<Projection<F>>(doc).map_err(|e| {
                StoreError::Serialization(format!(
                    "{} document {} failed to decode: {e}",
                    self.config.collection, input.key
                ))
            })?,
            None => Projection::seed(input.key.clone()),
        };

        let merged = if projection.has_event(&input.summary.key) {
            projection
        } else {
            self.merge(projection, input)
        };
        serde_json::to_value(merged).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Runs the merge as one atomic upsert of the aggregate at `input.key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the upsert fails or the stored document cannot
    /// be decoded.
    pub async fn run(
        &self,
        repo: &dyn ProjectionRepository,
        input: &MergeInput<F>,
    ) -> Result<(), StoreError> {
        let transform = |current: Option<serde_json::Value>| self.apply(current, input);
        repo.upsert(self.config.collection, &input.key, &transform)
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use fdm_core::event::CloudEvent;

    use super::*;
    use crate::domain::category::{MESSAGE_PREFIX, PAYMENT_PREFIX};
    use crate::domain::payload::{MessageFields, PaymentFields};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn entity(
        id: &str,
        event_type: &str,
        time: Option<DateTime<Utc>>,
        received: DateTime<Utc>,
    ) -> EventEntity {
        let event = CloudEvent {
            id: id.to_owned(),
            source: "src".to_owned(),
            event_type: event_type.to_owned(),
            specversion: "1.0".to_owned(),
            datacontenttype: None,
            time,
            subject: None,
            data: serde_json::json!({}),
        };
        EventEntity::new(&event, received)
    }

    fn message_input(
        id: &str,
        status: &str,
        time: DateTime<Utc>,
        fields: MessageFields,
    ) -> MergeInput<MessageFields> {
        let event_type = format!("{MESSAGE_PREFIX}{status}");
        let entity = entity(id, &event_type, Some(time), base_time());
        MergeInput::new("c1".to_owned(), fields, &entity)
    }

    fn message_pipeline() -> Pipeline<MessageFields> {
        PipelineBuilder::new(SaveConfig::new(Collection::Messages, MESSAGE_PREFIX)).build()
    }

    #[test]
    fn test_first_event_creates_aggregate() {
        // Arrange
        let pipeline = message_pipeline();
        let fields = MessageFields {
            recipient: Some("a@b.com".into()),
            ..MessageFields::default()
        };
        let input = message_input("e1", "request", base_time(), fields);

        // Act
        let result = pipeline.merge(Projection::seed("c1"), &input);

        // Assert
        assert_eq!(result.created, Some(base_time()));
        assert_eq!(result.last_updated, Some(base_time()));
        assert_eq!(result.last_event_time, Some(base_time()));
        assert_eq!(result.status.as_deref(), Some("request"));
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.fields.recipient.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn test_older_event_is_audited_but_does_not_change_status() {
        // Arrange
        let pipeline = message_pipeline();
        let later = base_time() + Duration::minutes(5);
        let newer = message_input("e2", "delivered", later, MessageFields::default());
        let older = message_input("e1", "sending", base_time(), MessageFields::default());
        let current = pipeline.merge(Projection::seed("c1"), &newer);

        // Act
        let result = pipeline.merge(current, &older);

        // Assert
        assert_eq!(result.status.as_deref(), Some("delivered"));
        assert_eq!(result.last_event_time, Some(later));
        let keys: Vec<&str> = result.events.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["src:e2", "src:e1"]);
    }

    #[test]
    fn test_equal_time_does_not_change_status() {
        // Arrange
        let pipeline = message_pipeline();
        let first = message_input("e1", "sending", base_time(), MessageFields::default());
        let second = message_input("e2", "delivered", base_time(), MessageFields::default());
        let current = pipeline.merge(Projection::seed("c1"), &first);

        // Act
        let result = pipeline.merge(current, &second);

        // Assert
        assert_eq!(result.status.as_deref(), Some("sending"));
    }

    #[test]
    fn test_created_is_never_overwritten() {
        // Arrange
        let pipeline = message_pipeline();
        let first = message_input("e1", "request", base_time(), MessageFields::default());
        let later_entity = entity(
            "e2",
            "uk.gov.fcp.sfd.notification.sending",
            None,
            base_time() + Duration::hours(1),
        );
        let second = MergeInput::new("c1".to_owned(), MessageFields::default(), &later_entity);
        let current = pipeline.merge(Projection::seed("c1"), &first);

        // Act
        let result = pipeline.merge(current, &second);

        // Assert
        assert_eq!(result.created, Some(base_time()));
        assert_eq!(result.last_updated, Some(base_time() + Duration::hours(1)));
        assert_eq!(result.status.as_deref(), Some("sending"));
    }

    #[test]
    fn test_reapplying_the_same_event_is_a_no_op_on_the_audit_trail() {
        // Arrange
        let pipeline = message_pipeline();
        let input = message_input("e1", "request", base_time(), MessageFields::default());
        let once = pipeline.merge(Projection::seed("c1"), &input);

        // Act
        let twice = pipeline.merge(once.clone(), &input);

        // Assert
        assert_eq!(once, twice);
    }

    #[test]
    fn test_latest_wins_ignores_fields_from_older_events() {
        // Arrange
        let config = SaveConfig::new(Collection::Payments, PAYMENT_PREFIX).latest_wins();
        let pipeline = PipelineBuilder::<PaymentFields>::new(config).build();
        let newer_entity = entity(
            "e2",
            "uk.gov.defra.ffc.pay.payment.settled",
            Some(base_time() + Duration::minutes(1)),
            base_time(),
        );
        let older_entity = entity(
            "e1",
            "uk.gov.defra.ffc.pay.payment.processed",
            Some(base_time()),
            base_time(),
        );
        let newer = MergeInput::new(
            "p1".to_owned(),
            PaymentFields {
                invoice_number: Some("INV-2".into()),
                ..PaymentFields::default()
            },
            &newer_entity,
        );
        let older = MergeInput::new(
            "p1".to_owned(),
            PaymentFields {
                invoice_number: Some("INV-1".into()),
                ..PaymentFields::default()
            },
            &older_entity,
        );
        let current = pipeline.merge(Projection::seed("p1"), &newer);

        // Act
        let result = pipeline.merge(current, &older);

        // Assert
        assert_eq!(result.fields.invoice_number.as_deref(), Some("INV-2"));
        assert_eq!(result.status.as_deref(), Some("settled"));
        assert_eq!(result.events.len(), 2);
    }

    #[test]
    fn test_skip_toggles_remove_their_stages() {
        // Arrange
        let mut config = SaveConfig::new(Collection::Messages, MESSAGE_PREFIX);
        config.skip_event_tracking = true;
        config.skip_status_tracking = true;
        let pipeline = PipelineBuilder::<MessageFields>::new(config).build();
        let input = message_input("e1", "request", base_time(), MessageFields::default());

        // Act
        let result = pipeline.merge(Projection::seed("c1"), &input);

        // Assert
        assert!(result.events.is_empty());
        assert!(result.status.is_none());
        assert!(result.last_event_time.is_none());
        assert_eq!(result.created, Some(base_time()));
    }

    #[test]
    fn test_extra_stages_run_after_common_stages() {
        // Arrange
        fn mark_body(
            mut projection: Projection<MessageFields>,
            _input: &MergeInput<MessageFields>,
        ) -> Projection<MessageFields> {
            let status = projection.status.clone().unwrap_or_default();
            projection.fields.body = Some(format!("after {status}"));
            projection
        }
        let config = SaveConfig::new(Collection::Messages, MESSAGE_PREFIX);
        let pipeline = PipelineBuilder::<MessageFields>::new(config)
            .with_stage(mark_body)
            .build();
        let input = message_input("e1", "request", base_time(), MessageFields::default());

        // Act
        let result = pipeline.merge(Projection::seed("c1"), &input);

        // Assert
        assert_eq!(result.fields.body.as_deref(), Some("after request"));
    }

    #[test]
    fn test_apply_leaves_an_aggregate_holding_the_event_unchanged() {
        // Arrange
        let pipeline = message_pipeline();
        let first = message_input("e1", "sending", base_time(), MessageFields::default());
        let second = message_input(
            "e2",
            "delivered",
            base_time() + Duration::minutes(1),
            MessageFields {
                body: Some("Second".into()),
                ..MessageFields::default()
            },
        );
        let once = pipeline.apply(None, &first).unwrap();
        let current = pipeline.apply(Some(once), &second).unwrap();
        let mut replayed = first.clone();
        replayed.fields.body = Some("First".into());

        // Act
        let result = pipeline.apply(Some(current.clone()), &replayed).unwrap();

        // Assert
        assert_eq!(result, current);
        assert_eq!(result["body"], "Second");
        assert_eq!(result["status"], "delivered");
    }

    #[test]
    fn test_apply_rejects_undecodable_documents() {
        // Arrange
        let pipeline = message_pipeline();
        let input = message_input("e1", "request", base_time(), MessageFields::default());

        // Act
        let result = pipeline.apply(Some(serde_json::json!({ "events": "nope" })), &input);

        // Assert
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
