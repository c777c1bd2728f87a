//! Category savers.
//!
//! Each category is a fixed configuration of the merge pipeline. Dispatch is
//! an exhaustive match over `EventPayload`, so a new category cannot be
//! added without deciding how it is saved.

use fdm_core::error::IngestError;
use fdm_core::event::{CloudEvent, EventEntity};
use fdm_core::projection::{Collection, Projection, ProjectionFields};
use fdm_core::repository::{EventLogRepository, ProjectionRepository};
use fdm_core::runtime::Clock;
use tracing::instrument;

use crate::application::event_log::record_once;
use crate::application::pipeline::{MergeInput, Pipeline, PipelineBuilder, SaveConfig};
use crate::domain::category::{CRM_PREFIX, DOCUMENT_PREFIX, MESSAGE_PREFIX, PAYMENT_PREFIX};
use crate::domain::payload::{
    CrmFields, DocumentFields, EventPayload, Keyed, MessageFields, PaymentFields,
};

/// What happened to an event handed to `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Logged and merged into its aggregate.
    Applied,
    /// Already logged and merged; nothing was written.
    Duplicate,
    /// Deliberately not persisted.
    Skipped,
}

/// Message aggregates. Content fields are only set when supplied.
#[must_use]
pub fn message_pipeline() -> Pipeline<MessageFields> {
    PipelineBuilder::new(SaveConfig::new(Collection::Messages, MESSAGE_PREFIX)).build()
}

/// Document aggregates, carrying the full file descriptor.
#[must_use]
pub fn document_pipeline() -> Pipeline<DocumentFields> {
    PipelineBuilder::new(SaveConfig::new(Collection::Documents, DOCUMENT_PREFIX)).build()
}

/// CRM case aggregates. File ids accumulate across events.
#[must_use]
pub fn crm_pipeline() -> Pipeline<CrmFields> {
    PipelineBuilder::new(SaveConfig::new(Collection::Crm, CRM_PREFIX))
        .with_stage(union_file_ids)
        .build()
}

/// Payment aggregates. Fields follow the newest event only.
#[must_use]
pub fn payment_pipeline() -> Pipeline<PaymentFields> {
    PipelineBuilder::new(SaveConfig::new(Collection::Payments, PAYMENT_PREFIX).latest_wins())
        .build()
}

fn union_file_ids(
    mut projection: Projection<CrmFields>,
    input: &MergeInput<CrmFields>,
) -> Projection<CrmFields> {
    projection
        .fields
        .file_ids
        .extend(input.fields.file_ids.iter().cloned());
    projection
}

/// Saves a validated event: records it once in the event log and, if it is
/// new, folds it into the aggregate its payload addresses.
///
/// # Errors
///
/// Returns `IngestError::Store` if the log or the aggregate cannot be
/// written.
#[instrument(
    skip_all,
    fields(event_id = %event.id, event_type = %event.event_type, category = %payload.category())
)]
pub async fn save(
    payload: EventPayload,
    event: &CloudEvent,
    clock: &dyn Clock,
    log: &dyn EventLogRepository,
    projections: &dyn ProjectionRepository,
) -> Result<SaveOutcome, IngestError> {
    match payload {
        EventPayload::Message(keyed) => {
            save_with(&message_pipeline(), keyed, event, clock, log, projections).await
        }
        EventPayload::Document(keyed) => {
            save_with(&document_pipeline(), keyed, event, clock, log, projections).await
        }
        EventPayload::Crm(keyed) => {
            save_with(&crm_pipeline(), keyed, event, clock, log, projections).await
        }
        EventPayload::Payment(keyed) => {
            save_with(&payment_pipeline(), keyed, event, clock, log, projections).await
        }
        EventPayload::MessageRejected => {
            tracing::info!("skipping save for rejected message event");
            Ok(SaveOutcome::Skipped)
        }
    }
}

async fn save_with<F: ProjectionFields>(
    pipeline: &Pipeline<F>,
    keyed: Keyed<F>,
    event: &CloudEvent,
    clock: &dyn Clock,
    log: &dyn EventLogRepository,
    projections: &dyn ProjectionRepository,
) -> Result<SaveOutcome, IngestError> {
    let entity = match record_once(event, clock, log).await? {
        Some(entity) => entity,
        None => match unmerged_entry(pipeline, &keyed.key, event, log, projections).await? {
            Some(entity) => {
                tracing::warn!(
                    collection = %pipeline.config().collection,
                    key = %keyed.key,
                    event_key = %entity.key,
                    "logged event missing from aggregate, merging again"
                );
                entity
            }
            None => return Ok(SaveOutcome::Duplicate),
        },
    };

    let input = MergeInput::new(keyed.key, keyed.fields, &entity);
    pipeline.run(projections, &input).await?;

    tracing::debug!(
        collection = %pipeline.config().collection,
        key = %input.key,
        "projection updated"
    );
    Ok(SaveOutcome::Applied)
}

/// Returns the logged entry for `event` when its aggregate does not yet hold
/// it, which happens when the merge failed after the log write. The stored
/// entry keeps its original `received` time.
async fn unmerged_entry<F: ProjectionFields>(
    pipeline: &Pipeline<F>,
    key: &str,
    event: &CloudEvent,
    log: &dyn EventLogRepository,
    projections: &dyn ProjectionRepository,
) -> Result<Option<EventEntity>, IngestError> {
    if pipeline.config().skip_event_tracking {
        return Ok(None);
    }
    let event_key = event.key();
    let merged = projections
        .find(pipeline.config().collection, key)
        .await?
        .is_some_and(|doc| holds_event(&doc, &event_key));
    if merged {
        return Ok(None);
    }
    Ok(log.find_event(&event_key).await?)
}

fn holds_event(doc: &serde_json::Value, event_key: &str) -> bool {
    doc["events"].as_array().is_some_and(|events| {
        events
            .iter()
            .any(|e| e["key"].as_str() == Some(event_key))
    })
}
