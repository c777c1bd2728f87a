//! Event ingestion for the fdm service.
//!
//! Turns queue messages into validated CloudEvents, records each one once in
//! the event log and folds it into the business-keyed projection it belongs
//! to. The `Poller` drives the whole pipeline.

pub mod application;
pub mod domain;
