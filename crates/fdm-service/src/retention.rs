//! Periodic removal of expired rows.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::watch;

use fdm_event_store::retention::purge_expired;

/// How often expired rows are purged.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Purges expired rows every `interval` until `cancel`'s sender is dropped.
pub async fn run_purge_loop(pool: PgPool, interval: Duration, mut cancel: watch::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.changed() => break,
        }
        match purge_expired(&pool, Utc::now()).await {
            Ok(removed) => tracing::debug!(removed, "retention purge complete"),
            Err(e) => tracing::error!(error = %e, "retention purge failed"),
        }
    }
}
