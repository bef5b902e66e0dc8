//! Transport over a directory mounted on this machine (NFS share, external
//! disk). Implements the same operations as the server, without HTTP.

use super::{ByteStream, RemoteCatalog};
use crate::catalog::CatalogBuilder;
use crate::digest::{digest_file, DigestAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::protocol::{is_safe_relative_path, ListEntry, SumResponse};
use crate::utils::{Result, SyncError};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

pub struct LocalRemote {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Resolve `path` to a regular file below the root.
    async fn resolve(&self, path: &str) -> Result<PathBuf> {
        if !is_safe_relative_path(path) {
            return Err(SyncError::NotFound(path.to_string()));
        }
        let full = self.root.join(path);
        let metadata = tokio::fs::symlink_metadata(&full)
            .await
            .map_err(|e| SyncError::from_io(e, path))?;
        if !metadata.is_file() {
            return Err(SyncError::NotFound(path.to_string()));
        }
        Ok(full)
    }
}

#[async_trait]
impl RemoteCatalog for LocalRemote {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn list(&self) -> Result<Vec<ListEntry>> {
        let root = self.root.clone();
        let outcome = tokio::task::spawn_blocking(move || CatalogBuilder::new(&root).build())
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;

        Ok(outcome
            .catalog
            .records()
            .map(|r| ListEntry {
                path: r.relative_path.clone(),
                size: r.size,
            })
            .collect())
    }

    async fn sum(&self, path: &str, algorithm: DigestAlgorithm) -> Result<SumResponse> {
        let full = self.resolve(path).await?;
        let chunk_size = self.chunk_size;
        let (digest, size) =
            tokio::task::spawn_blocking(move || digest_file(&full, algorithm, chunk_size))
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(e)))?
                .map_err(|e| SyncError::from_io(e, path))?;

        Ok(SumResponse {
            path: path.to_string(),
            size,
            algorithm,
            digest,
        })
    }

    async fn data(&self, path: &str, offset: u64, length: Option<u64>) -> Result<ByteStream> {
        let full = self.resolve(path).await?;
        let mut file = tokio::fs::File::open(&full)
            .await
            .map_err(|e| SyncError::from_io(e, path))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let reader = file.take(length.unwrap_or(u64::MAX));
        let stream = ReaderStream::with_capacity(reader, self.chunk_size.min(256 * 1024))
            .map(|chunk| chunk.map_err(SyncError::Io));
        Ok(stream.boxed())
    }
}
