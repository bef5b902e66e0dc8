use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// GET /health - liveness and configuration summary, no authentication
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.snapshot();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "generation": snapshot.generation,
        "resources": snapshot.registry.resource_count(),
        "digest_algorithm": snapshot.digest_algorithm,
        "idle_workers": state.workers.available(),
        "cached_sums": state.sum_cache.len(),
    }))
}
