//! Health check endpoint.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use fdm_ingestion::application::poller::PollerState;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Poller state: `stopped`, `idle` or `polling`.
    pub poller: &'static str,
}

fn poller_label(state: PollerState) -> &'static str {
    match state {
        PollerState::Stopped => "stopped",
        PollerState::Idle => "idle",
        PollerState::Polling => "polling",
    }
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        poller: poller_label(state.poller.state()),
    })
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
