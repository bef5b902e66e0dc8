//! Fixed-size worker pool for protocol requests.
//!
//! At most `workers` requests hold a permit at once; the permit travels with
//! the response body, so a long data stream keeps its worker until the last
//! byte is sent. A request that waits longer than the queue timeout is
//! answered with 503.

use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    queue_timeout: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            queue_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AppError> {
        match tokio::time::timeout(self.queue_timeout, self.semaphore.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(AppError::ServiceUnavailable("Server is shutting down".into())),
            Err(_) => {
                tracing::warn!(
                    queue_timeout_ms = self.queue_timeout.as_millis() as u64,
                    "No worker available, rejecting request"
                );
                Err(AppError::ServiceUnavailable("Server busy, retry later".into()))
            }
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Middleware admitting requests through the pool.
pub async fn limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let permit = state.workers.acquire().await?;
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let guarded = body.into_data_stream().map(move |chunk| {
        let _held = &permit;
        chunk
    });
    Ok(Response::from_parts(parts, Body::from_stream(guarded)))
}
