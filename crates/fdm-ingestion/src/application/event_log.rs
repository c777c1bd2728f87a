//! Idempotent event log.

use fdm_core::error::IngestError;
use fdm_core::event::{CloudEvent, EventEntity};
use fdm_core::repository::EventLogRepository;
use fdm_core::runtime::Clock;

/// Records `event` in the event log unless its `source:id` key is already
/// present.
///
/// Returns the stored entity, carrying the assigned `received` timestamp,
/// when this call wrote it. Returns `None` for a redelivered event; that is
/// the normal outcome of at-least-once delivery, not a failure.
///
/// # Errors
///
/// Returns `IngestError::Store` if the log cannot be written.
pub async fn record_once(
    event: &CloudEvent,
    clock: &dyn Clock,
    repo: &dyn EventLogRepository,
) -> Result<Option<EventEntity>, IngestError> {
    let entity = EventEntity::new(event, clock.now());

    if repo.insert_if_absent(&entity).await? {
        Ok(Some(entity))
    } else {
        tracing::warn!(
            event_key = %entity.key,
            event_type = %event.event_type,
            "event already logged"
        );
        Ok(None)
    }
}
