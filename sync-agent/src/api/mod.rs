//! HTTP control API for the sync agent.

pub mod health;
pub mod job_tracker;
pub mod sync;

use crate::config::Config;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub job_tracker: job_tracker::JobTracker,
    /// Parent of every run's cancellation token.
    pub shutdown: CancellationToken,
}

/// Create shared application state
pub fn create_app_state(config: Config, shutdown: CancellationToken) -> AppState {
    AppState {
        config: Arc::new(config),
        job_tracker: job_tracker::JobTracker::new(),
        shutdown,
    }
}

/// Create the API router with all endpoints
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        // Sync endpoints
        .route("/sync/start", post(sync::start_sync))
        .route("/sync/cancel", post(sync::cancel_sync))
        .route("/sync/status", get(sync::sync_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
