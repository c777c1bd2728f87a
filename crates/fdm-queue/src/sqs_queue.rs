//! Amazon SQS implementation of the `MessageQueue` trait.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::{Credentials, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, Message};

use fdm_core::error::IngestError;
use fdm_core::queue::{MessageQueue, QueueMessage};

/// Most entries SQS accepts in one `DeleteMessageBatch` request.
const MAX_DELETE_BATCH: usize = 10;
/// Longest long-poll wait SQS accepts.
const MAX_WAIT_SECONDS: i32 = 20;

/// Connection settings for the SQS client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqsSettings {
    pub queue_url: String,
    pub region: String,
    /// Overrides the service endpoint, e.g. for a local emulator.
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// An SQS queue.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Creates a `SqsQueue` from an existing client.
    #[must_use]
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Builds a client from `settings`. Static credentials are used when
    /// both keys are set; otherwise the default provider chain applies.
    pub async fn connect(settings: &SqsSettings) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "fdm-static",
            ));
        }

        let sdk_config = loader.load().await;
        tracing::info!(queue_url = %settings.queue_url, region = %settings.region, "sqs client configured");
        Self::new(Client::new(&sdk_config), settings.queue_url.clone())
    }
}

fn queue_error(context: &str, e: impl std::error::Error) -> IngestError {
    IngestError::Queue(format!("{context}: {}", DisplayErrorContext(e)))
}

/// Converts a received SQS message. Messages without a receipt handle cannot
/// be acknowledged and are dropped.
fn to_queue_message(message: &Message) -> Option<QueueMessage> {
    let receipt_handle = message.receipt_handle()?;
    Some(QueueMessage {
        message_id: message.message_id().unwrap_or_default().to_owned(),
        receipt_handle: receipt_handle.to_owned(),
        body: message.body().unwrap_or_default().to_owned(),
    })
}

/// Builds delete entries, using each message's position as the entry id.
fn delete_entries(
    messages: &[QueueMessage],
) -> Result<Vec<DeleteMessageBatchRequestEntry>, IngestError> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            DeleteMessageBatchRequestEntry::builder()
                .id(index.to_string())
                .receipt_handle(&message.receipt_handle)
                .build()
                .map_err(|e| queue_error("invalid delete entry", e))
        })
        .collect()
}

fn wait_seconds(wait_time: Duration) -> i32 {
    i32::try_from(wait_time.as_secs()).map_or(MAX_WAIT_SECONDS, |s| s.min(MAX_WAIT_SECONDS))
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, IngestError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds(wait_time))
            .send()
            .await
            .map_err(|e| queue_error("receive failed", e))?;

        let messages: Vec<QueueMessage> = output
            .messages()
            .iter()
            .filter_map(to_queue_message)
            .collect();
        Ok(messages)
    }

    async fn delete_batch(&self, messages: &[QueueMessage]) -> Result<(), IngestError> {
        for chunk in messages.chunks(MAX_DELETE_BATCH) {
            let output = self
                .client
                .delete_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(delete_entries(chunk)?))
                .send()
                .await
                .map_err(|e| queue_error("delete failed", e))?;

            for failed in output.failed() {
                tracing::warn!(
                    entry = failed.id(),
                    code = failed.code(),
                    reason = failed.message().unwrap_or_default(),
                    "message was not deleted"
                );
            }
        }
        Ok(())
    }
}
