//! Sync run endpoints.

use super::AppState;
use crate::api::job_tracker::RunningSync;
use crate::sync::SyncReport;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartSyncRequest {
    pub resource: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartSyncResponse {
    pub status: String,
    pub run_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CancelSyncRequest {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelSyncResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub running: Vec<RunningSync>,
    pub last_reports: HashMap<String, SyncReport>,
}

/// POST /sync/start - Start syncing one configured resource
pub async fn start_sync(
    State(app_state): State<AppState>,
    Json(req): Json<StartSyncRequest>,
) -> Result<Json<StartSyncResponse>, StatusCode> {
    let Some(resource) = app_state.config.resource(&req.resource) else {
        tracing::warn!(resource = %req.resource, "Sync requested for unknown resource");
        return Err(StatusCode::NOT_FOUND);
    };

    let driver = app_state.config.driver_for(resource).map_err(|e| {
        tracing::error!(resource = %req.resource, error = %e, "Could not prepare sync");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let run_id = Uuid::new_v4();
    let cancel = app_state.shutdown.child_token();
    let tracker = app_state.job_tracker.clone();

    if !tracker.register(run_id, &req.resource, cancel.clone()).await {
        tracing::warn!(resource = %req.resource, "Sync already running");
        return Err(StatusCode::CONFLICT);
    }

    tracing::info!(%run_id, resource = %req.resource, "Starting sync");

    tokio::spawn(async move {
        let report = driver.with_cancel(cancel).run_with_id(run_id).await;
        tracker.complete(report).await;
    });

    Ok(Json(StartSyncResponse {
        status: "started".to_string(),
        run_id,
    }))
}

/// POST /sync/cancel - Cancel a running sync
pub async fn cancel_sync(
    State(app_state): State<AppState>,
    Json(req): Json<CancelSyncRequest>,
) -> Result<Json<CancelSyncResponse>, StatusCode> {
    tracing::info!(run_id = %req.run_id, "Cancelling sync");

    if app_state.job_tracker.cancel(&req.run_id).await {
        Ok(Json(CancelSyncResponse {
            status: "cancelling".to_string(),
        }))
    } else {
        tracing::warn!(run_id = %req.run_id, "Run not found or already finished");
        Err(StatusCode::NOT_FOUND)
    }
}

/// GET /sync/status - Running syncs and the last report per resource
pub async fn sync_status(State(app_state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        running: app_state.job_tracker.running().await,
        last_reports: app_state.job_tracker.last_reports().await,
    })
}
