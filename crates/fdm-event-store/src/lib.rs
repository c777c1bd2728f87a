//! PostgreSQL storage for the fdm ingestion service.
//!
//! Implements the event log and projection repositories from `fdm-core` on
//! top of a shared `PgPool`, plus TTL-based retention.

mod error;
pub mod pg_event_log;
pub mod pg_projection_repository;
pub mod retention;
pub mod schema;
