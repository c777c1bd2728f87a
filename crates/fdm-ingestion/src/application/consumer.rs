//! Queue consumer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fdm_core::error::IngestError;
use fdm_core::queue::{MessageQueue, QueueMessage};
use fdm_core::repository::{EventLogRepository, ProjectionRepository};
use fdm_core::runtime::Clock;
use tracing::instrument;

use crate::application::parse::parse_message_body;
use crate::application::savers::{SaveOutcome, save};
use crate::domain::category::classify;
use crate::domain::schema::{validate_envelope, validate_payload};

/// Largest batch a single receive may request.
pub const DEFAULT_BATCH_SIZE: i32 = 10;
/// Long-poll wait for a single receive.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(10);

/// One consumption cycle. The seam between the `Poller` and the queue
/// pipeline.
#[async_trait]
pub trait ConsumeEvents: Send + Sync {
    /// Receives and processes one batch. Returns `true` if the batch was
    /// non-empty, whatever happened to its messages.
    async fn consume_once(&self) -> Result<bool, IngestError>;
}

/// Receive settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub batch_size: i32,
    pub wait_time: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            wait_time: DEFAULT_WAIT_TIME,
        }
    }
}

/// Pulls batches from the queue and pushes each message through parse,
/// validation, the event log and the merge pipeline.
pub struct Consumer {
    queue: Arc<dyn MessageQueue>,
    log: Arc<dyn EventLogRepository>,
    projections: Arc<dyn ProjectionRepository>,
    clock: Arc<dyn Clock>,
    settings: ConsumerSettings,
}

impl Consumer {
    #[must_use]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        log: Arc<dyn EventLogRepository>,
        projections: Arc<dyn ProjectionRepository>,
        clock: Arc<dyn Clock>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            log,
            projections,
            clock,
            settings,
        }
    }

    /// Runs a single message through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first failure: parse, classification, validation or
    /// store.
    #[instrument(skip_all, fields(message_id = %message.message_id))]
    pub async fn process_message(&self, message: &QueueMessage) -> Result<SaveOutcome, IngestError> {
        let raw = parse_message_body(&message.body)?;
        let event = validate_envelope(&raw)?;
        let category = classify(&event.event_type)?;
        let payload = validate_payload(category, &event)?;

        save(
            payload,
            &event,
            self.clock.as_ref(),
            self.log.as_ref(),
            self.projections.as_ref(),
        )
        .await
    }
}

#[async_trait]
impl ConsumeEvents for Consumer {
    async fn consume_once(&self) -> Result<bool, IngestError> {
        let messages = self
            .queue
            .receive(self.settings.batch_size, self.settings.wait_time)
            .await?;
        if messages.is_empty() {
            return Ok(false);
        }

        tracing::debug!(count = messages.len(), "received messages");

        let mut processed = Vec::with_capacity(messages.len());
        for message in messages {
            match self.process_message(&message).await {
                Ok(outcome) => {
                    tracing::debug!(message_id = %message.message_id, ?outcome, "message processed");
                    processed.push(message);
                }
                Err(e) if e.is_validation() => {
                    tracing::warn!(message_id = %message.message_id, error = %e, "message rejected");
                }
                Err(e) => {
                    tracing::error!(
                        message_id = %message.message_id,
                        timeout = e.is_timeout(),
                        error = %e,
                        "message processing failed"
                    );
                }
            }
        }

        if !processed.is_empty() {
            if let Err(e) = self.queue.delete_batch(&processed).await {
                tracing::error!(count = processed.len(), error = %e, "failed to delete processed messages");
            }
        }

        Ok(true)
    }
}
