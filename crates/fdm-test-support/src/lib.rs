//! Shared test doubles and utilities for the fdm ingestion service.

mod clock;
mod queue;
mod rng;
mod store;

pub use clock::{FixedClock, SequenceClock};
pub use queue::{FailingQueue, InMemoryQueue};
pub use rng::FixedRng;
pub use store::{FailingStore, FlakyStore, InMemoryStore};
