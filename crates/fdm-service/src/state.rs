//! Shared application state.

use std::sync::Arc;

use fdm_ingestion::application::poller::Poller;

/// State shared with HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ingestion poller, for health reporting.
    pub poller: Arc<Poller>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(poller: Arc<Poller>) -> Self {
        Self { poller }
    }
}
