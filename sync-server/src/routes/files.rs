//! Catalog protocol handlers: list a resource, digest one file, stream a
//! byte range of one file.
//!
//! Parameter checks come first (token, resource, path, in that order), then
//! authorization, then path resolution. A path that escapes the resource
//! root, crosses a symlink, or names something other than a regular file is
//! reported as not found.

use super::params::ProtocolParams;
use crate::error::AppError;
use crate::services::sum_cache::SumKey;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_agent::catalog::CatalogBuilder;
use sync_agent::digest::{digest_file, DigestAlgorithm, DEFAULT_CHUNK_SIZE};
use sync_agent::fs::FileStamp;
use sync_agent::protocol::{
    is_safe_relative_path, ListEntry, ListResponse, SumResponse, PARAM_ALGORITHM, PARAM_LENGTH,
    PARAM_OFFSET, PARAM_PATH, PARAM_RESOURCE, PARAM_TOKEN, TOTAL_SIZE_HEADER,
};
use sync_agent::SyncError;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Map `relative` onto a regular file below `root`. Every component is
/// checked without following symlinks.
fn resolve_file(root: &Path, relative: &str) -> Result<(PathBuf, FileStamp), AppError> {
    let not_found = || AppError::NotFound(format!("Not found: {}", relative));
    if !is_safe_relative_path(relative) {
        return Err(not_found());
    }

    let mut current = root.to_path_buf();
    let mut parts = relative.split('/').peekable();
    while let Some(part) = parts.next() {
        current.push(part);
        let metadata = std::fs::symlink_metadata(&current).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                AppError::NotFound(format!("Not readable: {}", relative))
            } else {
                not_found()
            }
        })?;
        let expected = if parts.peek().is_some() {
            metadata.is_dir()
        } else {
            metadata.is_file()
        };
        if !expected {
            return Err(not_found());
        }
        if parts.peek().is_none() {
            let stamp = FileStamp::from_metadata(&metadata).map_err(|e| AppError::Internal(e.into()))?;
            return Ok((current, stamp));
        }
    }
    Err(not_found())
}

async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

/// GET|POST /file-list
pub async fn file_list(
    State(state): State<Arc<AppState>>,
    params: ProtocolParams,
) -> Result<Json<ListResponse>, AppError> {
    let token = params.required(PARAM_TOKEN)?;
    let resource_name = params.required(PARAM_RESOURCE)?;

    let snapshot = state.snapshot();
    let resource = snapshot.registry.authorize(token, resource_name)?.clone();

    tracing::debug!(resource = %resource.name, "Listing resource");

    let root = resource.root_path.clone();
    let outcome = blocking(move || {
        CatalogBuilder::new(&root).build().map_err(|e| match e {
            // a missing root is a server misconfiguration, not a client error
            SyncError::NotFound(_) | SyncError::NotADirectory(_) => {
                AppError::Internal(anyhow::anyhow!("resource root unavailable: {}", e))
            }
            other => other.into(),
        })
    })
    .await?;

    if !outcome.issues.is_empty() {
        tracing::warn!(
            resource = %resource.name,
            skipped = outcome.issues.len(),
            "Parts of the resource could not be read"
        );
    }

    let files = outcome
        .catalog
        .records()
        .map(|r| ListEntry {
            path: r.relative_path.clone(),
            size: r.size,
        })
        .collect();

    Ok(Json(ListResponse {
        resource: resource.name,
        algorithm: snapshot.digest_algorithm,
        files,
        skipped: outcome.issues.len(),
    }))
}

/// GET|POST /file-sum
pub async fn file_sum(
    State(state): State<Arc<AppState>>,
    params: ProtocolParams,
) -> Result<Json<SumResponse>, AppError> {
    let token = params.required(PARAM_TOKEN)?;
    let resource_name = params.required(PARAM_RESOURCE)?;
    let path = params.required(PARAM_PATH)?.to_string();

    let snapshot = state.snapshot();
    let resource = snapshot.registry.authorize(token, resource_name)?.clone();
    let algorithm = match params.optional(PARAM_ALGORITHM) {
        Some(name) => name
            .parse::<DigestAlgorithm>()
            .map_err(AppError::BadRequest)?,
        None => snapshot.digest_algorithm,
    };

    let root = resource.root_path.clone();
    let relative = path.clone();
    let (full, stamp) = blocking(move || resolve_file(&root, &relative)).await?;

    let key = SumKey {
        resource: resource.name.clone(),
        path: path.clone(),
        algorithm,
    };
    if let Some(digest) = state.sum_cache.get(&key, &stamp, snapshot.generation) {
        tracing::debug!(resource = %resource.name, path = %path, "Digest served from cache");
        return Ok(Json(SumResponse {
            path,
            size: stamp.size,
            algorithm,
            digest,
        }));
    }

    let (digest, size) = blocking(move || {
        digest_file(&full, algorithm, DEFAULT_CHUNK_SIZE)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing failed: {}", e)))
    })
    .await?;

    tracing::debug!(resource = %resource.name, path = %path, %algorithm, size, "Digest computed");

    // a file that changed while being read is not cached
    if size == stamp.size {
        state
            .sum_cache
            .insert(key, stamp, digest.clone(), snapshot.generation);
    }

    Ok(Json(SumResponse {
        path,
        size,
        algorithm,
        digest,
    }))
}

/// GET|POST /file-data
pub async fn file_data(
    State(state): State<Arc<AppState>>,
    params: ProtocolParams,
) -> Result<Response, AppError> {
    let token = params.required(PARAM_TOKEN)?;
    let resource_name = params.required(PARAM_RESOURCE)?;
    let path = params.required(PARAM_PATH)?.to_string();
    let offset: u64 = params.parsed(PARAM_OFFSET)?.unwrap_or(0);
    let length: Option<u64> = params.parsed(PARAM_LENGTH)?;

    let snapshot = state.snapshot();
    let resource = snapshot.registry.authorize(token, resource_name)?.clone();

    let root = resource.root_path.clone();
    let relative = path.clone();
    let (full, stamp) = blocking(move || resolve_file(&root, &relative)).await?;

    if offset > stamp.size {
        return Err(AppError::RangeNotSatisfiable(format!(
            "Offset {} is past the end of {} ({} bytes)",
            offset, path, stamp.size
        )));
    }
    let remaining = stamp.size - offset;
    let count = length.map_or(remaining, |l| l.min(remaining));

    tracing::debug!(resource = %resource.name, path = %path, offset, count, "Streaming file data");

    let mut file = tokio::fs::File::open(&full)
        .await
        .map_err(|_| AppError::NotFound(format!("Not found: {}", path)))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let body = Body::from_stream(ReaderStream::new(file.take(count)));

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, count.to_string()),
            (
                header::HeaderName::from_static(TOTAL_SIZE_HEADER),
                stamp.size.to_string(),
            ),
        ],
        body,
    )
        .into_response())
}
