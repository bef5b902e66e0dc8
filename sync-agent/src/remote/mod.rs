//! Remote catalog transports.
//!
//! The sync driver talks to the other side only through [`RemoteCatalog`]:
//! list the resource, ask for one file's digest, stream a byte range.
//! [`HttpRemote`] speaks the catalog protocol to a server; [`LocalRemote`]
//! serves a directory that is already mounted on this machine.

pub mod http;
pub mod local;

pub use http::HttpRemote;
pub use local::LocalRemote;

use crate::digest::DigestAlgorithm;
use crate::protocol::{ListEntry, SumResponse};
use crate::utils::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Stream of file bytes from a data request.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One remote resource.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Every file of the resource with its size.
    async fn list(&self) -> Result<Vec<ListEntry>>;

    /// Digest of one file computed with `algorithm`.
    async fn sum(&self, path: &str, algorithm: DigestAlgorithm) -> Result<SumResponse>;

    /// Bytes `offset..offset + length` of a file (`None` = to the end).
    async fn data(&self, path: &str, offset: u64, length: Option<u64>) -> Result<ByteStream>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory remote used by the planner and driver tests.

    use super::*;
    use crate::utils::SyncError;
    use futures_util::StreamExt;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryRemote {
        pub files: Mutex<BTreeMap<String, Vec<u8>>>,
        pub sum_calls: AtomicUsize,
        pub data_calls: AtomicUsize,
        /// Fail every data request after this many succeeded.
        pub fail_data_after: Option<usize>,
        /// Serve this content instead of the real bytes on data requests.
        pub corrupt: Mutex<BTreeMap<String, Vec<u8>>>,
        /// Serve each corrupt entry only once.
        pub corrupt_once: bool,
        /// Send one chunk per data request, then nothing.
        pub stall_after_first_chunk: bool,
    }

    impl MemoryRemote {
        pub fn with_files(files: &[(&str, &[u8])]) -> Self {
            let remote = Self::default();
            {
                let mut map = remote.files.lock().unwrap();
                for (path, data) in files {
                    map.insert(path.to_string(), data.to_vec());
                }
            }
            remote
        }

        fn content(&self, path: &str) -> Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(path.to_string()))
        }
    }

    #[async_trait]
    impl RemoteCatalog for MemoryRemote {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        async fn list(&self) -> Result<Vec<ListEntry>> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(path, data)| ListEntry {
                    path: path.clone(),
                    size: data.len() as u64,
                })
                .collect())
        }

        async fn sum(&self, path: &str, algorithm: DigestAlgorithm) -> Result<SumResponse> {
            self.sum_calls.fetch_add(1, Ordering::SeqCst);
            let data = self.content(path)?;
            Ok(SumResponse {
                path: path.to_string(),
                size: data.len() as u64,
                algorithm,
                digest: algorithm.digest_bytes(&data),
            })
        }

        async fn data(&self, path: &str, offset: u64, length: Option<u64>) -> Result<ByteStream> {
            let served = self.data_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_data_after {
                if served >= limit {
                    return Err(SyncError::NetworkFailure("connection reset".to_string()));
                }
            }

            let corrupted = {
                let mut corrupt = self.corrupt.lock().unwrap();
                if self.corrupt_once {
                    corrupt.remove(path)
                } else {
                    corrupt.get(path).cloned()
                }
            };
            let data = match corrupted {
                Some(bad) => bad,
                None => self.content(path)?,
            };
            let start = (offset as usize).min(data.len());
            let end = match length {
                Some(len) => (start + len as usize).min(data.len()),
                None => data.len(),
            };
            let chunks: Vec<Result<Bytes>> = data[start..end]
                .chunks(4)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            if self.stall_after_first_chunk {
                let head = chunks.into_iter().take(1);
                return Ok(futures_util::stream::iter(head)
                    .chain(futures_util::stream::pending())
                    .boxed());
            }
            Ok(futures_util::stream::iter(chunks).boxed())
        }
    }
}
