//! fdm ingestion service entry point.

use std::sync::Arc;

use axum::Router;
use fdm_core::runtime::{SystemClock, ThreadRng};
use fdm_event_store::pg_event_log::PgEventLogRepository;
use fdm_event_store::pg_projection_repository::PgProjectionRepository;
use fdm_ingestion::application::consumer::Consumer;
use fdm_ingestion::application::poller::Poller;
use fdm_queue::sqs_queue::SqsQueue;
use fdm_service::config::ServiceConfig;
use fdm_service::error::AppError;
use fdm_service::state::AppState;
use fdm_service::{db, retention, routes};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting fdm ingestion service");

    let config = ServiceConfig::from_env()?;

    // Store: pool, migrations, repositories.
    let pool = db::connect(&config).await?;
    let event_log = Arc::new(PgEventLogRepository::new(pool.clone()).with_ttl(config.ttl));
    let projections = Arc::new(PgProjectionRepository::new(pool.clone()).with_ttl(config.ttl));

    // Queue and ingestion pipeline.
    let queue = Arc::new(SqsQueue::connect(&config.sqs).await);
    let consumer = Arc::new(Consumer::new(
        queue,
        event_log,
        projections,
        Arc::new(SystemClock),
        config.consumer,
    ));
    let poller = Arc::new(Poller::new(consumer, config.backoff, Box::new(ThreadRng)));
    poller.start();

    // Retention runs only when a TTL is configured.
    let (purge_cancel, purge_rx) = watch::channel(());
    let purge_task = config.ttl.map(|_| {
        tokio::spawn(retention::run_purge_loop(
            pool.clone(),
            retention::PURGE_INTERVAL,
            purge_rx,
        ))
    });

    let app = Router::new()
        .merge(routes::health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(Arc::clone(&poller)));

    let addr = config.listen_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    // Let the in-flight batch finish before the pool goes away.
    tracing::info!("Shutting down");
    poller.shutdown().await;
    drop(purge_cancel);
    if let Some(task) = purge_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "retention task ended abnormally");
        }
    }
    pool.close().await;

    Ok(())
}
