//! Catalog protocol client over HTTP.

use super::{ByteStream, RemoteCatalog};
use crate::digest::DigestAlgorithm;
use crate::protocol::{
    ErrorResponse, ListEntry, ListResponse, SumResponse, FILE_DATA_PATH, FILE_LIST_PATH,
    FILE_SUM_PATH, PARAM_ALGORITHM, PARAM_LENGTH, PARAM_OFFSET, PARAM_PATH, PARAM_RESOURCE,
    PARAM_TOKEN,
};
use crate::utils::{Result, SyncError};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::debug;

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: String,
    resource: String,
}

impl HttpRemote {
    pub fn new(
        base_url: &str,
        token: &str,
        resource: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!("sync-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            resource: resource.to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Response> {
        let mut query: Vec<(&str, String)> = vec![
            (PARAM_TOKEN, self.token.clone()),
            (PARAM_RESOURCE, self.resource.clone()),
        ];
        query.extend(params.iter().cloned());

        debug!(endpoint, resource = %self.resource, "Catalog request");

        let response = self
            .client
            .get(self.url(endpoint))
            .query(&query)
            .send()
            .await
            .map_err(|e| SyncError::NetworkFailure(format!("{}: {}", endpoint, e)))?;

        check_status(response).await
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized,
        StatusCode::NOT_FOUND => SyncError::NotFound(message),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            SyncError::NetworkFailure(format!("{}: {}", s, message))
        }
        s => SyncError::Protocol(format!("{}: {}", s, message)),
    })
}

#[async_trait]
impl RemoteCatalog for HttpRemote {
    fn describe(&self) -> String {
        format!("{}#{}", self.base_url, self.resource)
    }

    async fn list(&self) -> Result<Vec<ListEntry>> {
        let response = self.get(FILE_LIST_PATH, &[]).await?;
        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| SyncError::NetworkFailure(format!("reading listing: {}", e)))?;

        if listing.skipped > 0 {
            tracing::warn!(
                resource = %self.resource,
                skipped = listing.skipped,
                "Server could not read part of the resource"
            );
        }
        Ok(listing.files)
    }

    async fn sum(&self, path: &str, algorithm: DigestAlgorithm) -> Result<SumResponse> {
        let response = self
            .get(
                FILE_SUM_PATH,
                &[
                    (PARAM_PATH, path.to_string()),
                    (PARAM_ALGORITHM, algorithm.to_string()),
                ],
            )
            .await?;
        let sum: SumResponse = response
            .json()
            .await
            .map_err(|e| SyncError::NetworkFailure(format!("reading digest: {}", e)))?;

        if sum.algorithm != algorithm {
            return Err(SyncError::Protocol(format!(
                "asked for a {} digest of {}, got {}",
                algorithm, path, sum.algorithm
            )));
        }
        Ok(sum)
    }

    async fn data(&self, path: &str, offset: u64, length: Option<u64>) -> Result<ByteStream> {
        let mut params = vec![
            (PARAM_PATH, path.to_string()),
            (PARAM_OFFSET, offset.to_string()),
        ];
        if let Some(length) = length {
            params.push((PARAM_LENGTH, length.to_string()));
        }

        let response = self.get(FILE_DATA_PATH, &params).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SyncError::NetworkFailure(format!("reading data: {}", e))));
        Ok(stream.boxed())
    }
}
