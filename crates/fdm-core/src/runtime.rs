//! Time and randomness sources.
//!
//! Both are injected rather than read from globals so that ingestion and
//! polling stay deterministic under test.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Abstraction over system time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `f64` in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64;
}

/// Production RNG backed by the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRng;

impl DeterministicRng for ThreadRng {
    fn next_f64(&mut self) -> f64 {
        rand::rng().random::<f64>()
    }
}
