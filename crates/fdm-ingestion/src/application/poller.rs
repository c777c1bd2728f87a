//! Adaptive polling loop.
//!
//! The poller owns one tokio task that calls `ConsumeEvents::consume_once`,
//! sleeps for a delay chosen by `Backoff`, and repeats until stopped.
//! Cancellation is a `watch` channel: dropping the sender wakes the task out
//! of its sleep and ends the loop. A cycle that is already running is never
//! interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fdm_core::runtime::DeterministicRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::consumer::ConsumeEvents;

/// Delay bounds and jitter for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay after a cycle that found work. Never jittered.
    pub min: Duration,
    /// Upper bound of the doubling delay, and the delay after an error.
    pub max: Duration,
    /// Relative jitter, e.g. `0.15` for +/-15%.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(5),
            max: Duration::from_secs(32),
            jitter: 0.15,
        }
    }
}

/// Exponential backoff with jitter.
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    rng: Box<dyn DeterministicRng>,
}

impl Backoff {
    #[must_use]
    pub fn new(config: BackoffConfig, rng: Box<dyn DeterministicRng>) -> Self {
        Self {
            current: config.min,
            config,
            rng,
        }
    }

    /// The un-jittered delay last chosen.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Work was found: drop straight back to the floor.
    pub fn on_work(&mut self) -> Duration {
        self.current = self.config.min;
        self.current
    }

    /// The queue was empty: double, up to the ceiling.
    pub fn on_empty(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.config.max);
        self.jittered(self.current)
    }

    /// The cycle failed: jump to the ceiling.
    pub fn on_error(&mut self) -> Duration {
        self.current = self.config.max;
        self.jittered(self.current)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn jittered(&mut self, delay: Duration) -> Duration {
        let spread = self.config.jitter * (2.0 * self.rng.next_f64() - 1.0);
        let nanos = delay.as_nanos() as f64 * (1.0 + spread).max(0.0);
        Duration::from_nanos(nanos.round() as u64)
    }
}

/// Observable poller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    /// Enabled, waiting for the next cycle.
    Idle,
    /// A cycle is running.
    Polling,
}

struct Shared {
    consumer: Arc<dyn ConsumeEvents>,
    backoff: Mutex<Backoff>,
    floor: Duration,
    enabled: AtomicBool,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a cycle ends, including by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    async fn poll_once(&self) -> Option<Duration> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("poll already in flight, skipping");
            return None;
        }
        let guard = InFlight(&self.in_flight);
        let result = self.consumer.consume_once().await;
        drop(guard);

        let mut backoff = lock(&self.backoff);
        let delay = match result {
            Ok(true) => backoff.on_work(),
            Ok(false) => backoff.on_empty(),
            Err(e) => {
                tracing::error!(error = %e, "poll cycle failed");
                backoff.on_error()
            }
        };
        Some(delay)
    }

    async fn run(self: Arc<Self>, mut cancel: watch::Receiver<()>) {
        tracing::info!("poller started");
        loop {
            let delay = self.poll_once().await.unwrap_or(self.floor);
            if !self.enabled.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => break,
            }
        }
        tracing::info!("poller stopped");
    }
}

/// Drives the consumer in a cancellable loop with adaptive delays.
pub struct Poller {
    shared: Arc<Shared>,
    cancel: Mutex<Option<watch::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    #[must_use]
    pub fn new(
        consumer: Arc<dyn ConsumeEvents>,
        config: BackoffConfig,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                consumer,
                backoff: Mutex::new(Backoff::new(config, rng)),
                floor: config.min,
                enabled: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
            }),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Starts the loop with an immediate first cycle. Does nothing if the
    /// poller is already running. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if self.shared.enabled.swap(true, Ordering::AcqRel) {
            return;
        }
        let (tx, rx) = watch::channel(());
        *lock(&self.cancel) = Some(tx);

        // A loop stopped earlier without `shutdown` is detached here; its
        // sender is gone, so it exits after its current cycle.
        let task = tokio::spawn(Arc::clone(&self.shared).run(rx));
        *lock(&self.task) = Some(task);
    }

    /// Stops scheduling cycles and cancels any pending sleep. A cycle in
    /// flight runs to completion.
    pub fn stop(&self) {
        self.shared.enabled.store(false, Ordering::Release);
        lock(&self.cancel).take();
    }

    /// Stops the poller and waits for the loop task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "poller task ended abnormally");
            }
        }
    }

    /// Runs one cycle now and returns the delay it chose, or `None` if a
    /// cycle was already in flight.
    pub async fn poll_once(&self) -> Option<Duration> {
        self.shared.poll_once().await
    }

    #[must_use]
    pub fn state(&self) -> PollerState {
        if self.shared.in_flight.load(Ordering::Acquire) {
            PollerState::Polling
        } else if self.shared.enabled.load(Ordering::Acquire) {
            PollerState::Idle
        } else {
            PollerState::Stopped
        }
    }

    /// The un-jittered delay last chosen.
    #[must_use]
    pub fn current_backoff(&self) -> Duration {
        lock(&self.shared.backoff).current()
    }
}
