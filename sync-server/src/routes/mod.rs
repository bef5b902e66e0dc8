pub mod files;
pub mod health;
pub mod params;

use crate::services::worker_pool;
use crate::state::AppState;
use axum::routing::get;
use axum::{middleware, Router};
use std::sync::Arc;
use sync_agent::protocol::{FILE_DATA_PATH, FILE_LIST_PATH, FILE_SUM_PATH};
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let protocol = Router::new()
        .route(FILE_LIST_PATH, get(files::file_list).post(files::file_list))
        .route(FILE_SUM_PATH, get(files::file_sum).post(files::file_sum))
        .route(FILE_DATA_PATH, get(files::file_data).post(files::file_data))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            worker_pool::limit,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(protocol)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
