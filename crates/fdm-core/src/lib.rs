//! fdm Core: shared event and projection abstractions.
//!
//! This crate defines the CloudEvent envelope, the projection document
//! shape, and the repository, queue, clock and RNG traits that the
//! ingestion pipeline depends on. It contains no infrastructure code.

pub mod error;
pub mod event;
pub mod projection;
pub mod query;
pub mod queue;
pub mod repository;
pub mod runtime;
