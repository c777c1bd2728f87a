//! Test queues: in-memory `MessageQueue` implementations for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fdm_core::error::IngestError;
use fdm_core::queue::{MessageQueue, QueueMessage};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueueMessage>,
    in_flight: Vec<QueueMessage>,
    deleted: Vec<QueueMessage>,
    delete_calls: usize,
    next_id: usize,
    deliveries: usize,
}

/// A queue held in memory. Received messages move to an in-flight set until
/// deleted; `expire_visibility` returns them to the queue, mimicking a lapsed
/// visibility timeout.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `body` and returns its message id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let message_id = format!("msg-{}", state.next_id);
        state.pending.push_back(QueueMessage {
            message_id: message_id.clone(),
            receipt_handle: String::new(),
            body: body.into(),
        });
        message_id
    }

    /// Makes every undeleted in-flight message visible again.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn expire_visibility(&self) {
        let mut state = self.state.lock().unwrap();
        let returned: Vec<QueueMessage> = state.in_flight.drain(..).collect();
        state.pending.extend(returned);
    }

    /// Number of messages waiting to be received.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Ids of messages received but not yet deleted.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn in_flight_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.in_flight.iter().map(|m| m.message_id.clone()).collect()
    }

    /// Ids of deleted messages, in deletion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn deleted_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.deleted.iter().map(|m| m.message_id.clone()).collect()
    }

    /// Number of `delete_batch` calls made.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delete_calls(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive(
        &self,
        max_messages: i32,
        _wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, IngestError> {
        let mut state = self.state.lock().unwrap();
        let max = usize::try_from(max_messages).unwrap_or(0);
        let mut received = Vec::new();
        while received.len() < max {
            let Some(mut message) = state.pending.pop_front() else {
                break;
            };
            state.deliveries += 1;
            message.receipt_handle = format!("{}-receipt-{}", message.message_id, state.deliveries);
            state.in_flight.push(message.clone());
            received.push(message);
        }
        Ok(received)
    }

    async fn delete_batch(&self, messages: &[QueueMessage]) -> Result<(), IngestError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        for message in messages {
            if let Some(pos) = state
                .in_flight
                .iter()
                .position(|m| m.receipt_handle == message.receipt_handle)
            {
                let deleted = state.in_flight.remove(pos);
                state.deleted.push(deleted);
            }
        }
        Ok(())
    }
}

/// A queue whose every operation fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingQueue;

#[async_trait]
impl MessageQueue for FailingQueue {
    async fn receive(
        &self,
        _max_messages: i32,
        _wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, IngestError> {
        Err(IngestError::Queue("connection refused".into()))
    }

    async fn delete_batch(&self, _messages: &[QueueMessage]) -> Result<(), IngestError> {
        Err(IngestError::Queue("connection refused".into()))
    }
}
