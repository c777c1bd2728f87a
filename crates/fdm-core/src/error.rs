//! Error types shared by the ingestion pipeline and its repositories.

use thiserror::Error;

/// Errors raised by persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store did not answer within its time limit.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// A conditional write kept losing to concurrent writers.
    #[error("write conflict on {0}")]
    Conflict(String),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Connection or query failure.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// Per-message failures of the ingestion pipeline.
///
/// Every variant leaves the queue message in place for redelivery. A
/// duplicate event is not an error and never surfaces here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The queue message body was not valid JSON.
    #[error("unable to parse message body: {0}")]
    Parse(String),

    /// The event `type` matched no known category.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The event failed schema validation. Holds every violated constraint.
    #[error("event is invalid: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// The store rejected or timed out an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The queue client failed.
    #[error("queue error: {0}")]
    Queue(String),
}

impl IngestError {
    /// Returns `true` when the underlying cause is a store timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Store(StoreError::Timeout(_)))
    }

    /// Returns `true` for parse, classification and schema failures.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::UnknownEventType(_) | Self::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_violation() {
        let err = IngestError::Validation(vec![
            "\"id\" is required".to_owned(),
            "\"data\" is required".to_owned(),
        ]);

        assert_eq!(
            err.to_string(),
            "event is invalid: \"id\" is required, \"data\" is required"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_store_timeout_is_reported_distinctly() {
        let timeout = IngestError::from(StoreError::Timeout("pool".into()));
        let other = IngestError::from(StoreError::Infrastructure("down".into()));

        assert!(timeout.is_timeout());
        assert!(!other.is_timeout());
        assert!(!timeout.is_validation());
    }
}
