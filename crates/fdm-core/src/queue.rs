//! Message queue abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::IngestError;

/// A message claimed from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue-assigned message identifier.
    pub message_id: String,
    /// Handle used to acknowledge (delete) this delivery.
    pub receipt_handle: String,
    /// Raw message body.
    pub body: String,
}

/// A queue with visibility-timeout semantics: received messages stay
/// invisible to other consumers until deleted or until the timeout lapses.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receives up to `max_messages`, long-polling for at most `wait_time`.
    async fn receive(
        &self,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, IngestError>;

    /// Deletes every message in `messages` in a single call.
    async fn delete_batch(&self, messages: &[QueueMessage]) -> Result<(), IngestError>;
}
