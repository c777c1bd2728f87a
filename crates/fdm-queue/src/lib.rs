//! Queue adapter for the fdm ingestion service.
//!
//! Implements `fdm_core::queue::MessageQueue` on Amazon SQS.

pub mod sqs_queue;
