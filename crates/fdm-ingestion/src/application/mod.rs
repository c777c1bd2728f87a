//! Ingestion use cases: parsing, logging, merging, consuming and polling.

pub mod consumer;
pub mod event_log;
pub mod parse;
pub mod pipeline;
pub mod poller;
pub mod savers;
