//! Shared test helpers for service integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use fdm_ingestion::application::consumer::{Consumer, ConsumerSettings};
use fdm_ingestion::application::poller::{BackoffConfig, Poller};
use fdm_service::routes;
use fdm_service::state::AppState;
use fdm_test_support::{FixedClock, FixedRng, InMemoryQueue, InMemoryStore};

/// A poller over in-memory doubles. Not started.
pub fn build_test_poller() -> Arc<Poller> {
    let store = Arc::new(InMemoryStore::new());
    let consumer = Consumer::new(
        Arc::new(InMemoryQueue::new()),
        store.clone(),
        store,
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())),
        ConsumerSettings::default(),
    );
    Arc::new(Poller::new(
        Arc::new(consumer),
        BackoffConfig::default(),
        Box::new(FixedRng(0.5)),
    ))
}

/// Build the app router the way `main.rs` does.
pub fn build_test_app(poller: Arc<Poller>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .with_state(AppState::new(poller))
}

/// Send a GET request and return the status and JSON body.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
