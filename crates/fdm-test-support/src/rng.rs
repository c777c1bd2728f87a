//! Test RNG: deterministic `DeterministicRng` implementation for tests.

use fdm_core::runtime::DeterministicRng;

/// An RNG that always returns the same value from `next_f64`.
///
/// `FixedRng(0.5)` yields zero jitter; `0.0` and values close to `1.0` pull
/// jittered delays to the bottom and top of their range.
#[derive(Debug, Clone, Copy)]
pub struct FixedRng(pub f64);

impl DeterministicRng for FixedRng {
    fn next_f64(&mut self) -> f64 {
        self.0
    }
}
