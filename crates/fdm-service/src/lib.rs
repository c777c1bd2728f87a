//! fdm ingestion service.
//!
//! Wires configuration, the Postgres store, the SQS queue and the ingestion
//! poller together, and exposes a health endpoint.

pub mod config;
pub mod db;
pub mod error;
pub mod retention;
pub mod routes;
pub mod state;
