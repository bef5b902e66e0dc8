//! Fetching one file into the local mirror.
//!
//! Bytes land in a hidden partial file next to the destination. A dropped
//! connection resumes from the partial file's length with a ranged data
//! request. The partial file is renamed over the destination only after its
//! digest matches the expected one, so a file visible under its final name is
//! always complete.

use super::retry::RetryPolicy;
use crate::digest::{digest_file, Digest, DigestAlgorithm};
use crate::protocol::is_safe_relative_path;
use crate::remote::RemoteCatalog;
use crate::transfer::progress::ProgressTracker;
use crate::transfer::{ProgressEvent, ProgressReporter};
use crate::utils::{Result, SyncError};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Suffix of in-flight downloads. Files named `.<name>.sync-partial` are
/// never part of a local catalog.
pub const PARTIAL_SUFFIX: &str = ".sync-partial";

/// Partial-file path for `dest`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}{}", name, PARTIAL_SUFFIX))
}

/// Whether a relative path names a partial download.
pub fn is_partial_path(relative_path: &str) -> bool {
    let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

/// Shared byte counter for the transfer phase, reported at a bounded rate.
pub struct TransferMeter {
    tracker: Mutex<ProgressTracker>,
    reporter: Mutex<ProgressReporter>,
}

impl TransferMeter {
    pub fn new(total_bytes: u64, total_files: usize, reporter: ProgressReporter) -> Self {
        Self {
            tracker: Mutex::new(ProgressTracker::new(total_bytes, total_files)),
            reporter: Mutex::new(reporter),
        }
    }

    /// Account for `bytes` more received bytes.
    pub fn add_bytes(&self, bytes: u64) {
        let event = {
            let Ok(mut tracker) = self.tracker.lock() else {
                return;
            };
            let total = tracker.progress().transferred_bytes + bytes;
            ProgressEvent::Transfer(tracker.update(total).clone())
        };
        if let Ok(mut reporter) = self.reporter.lock() {
            reporter.report(event);
        }
    }

    pub fn start_file(&self, path: &str) {
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.progress_mut().set_current_file(path.to_string());
        }
    }

    pub fn finish_file(&self) {
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.progress_mut().increment_files();
        }
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.tracker
            .lock()
            .map(|t| t.progress().transferred_bytes)
            .unwrap_or(0)
    }

    /// Send the final state regardless of the rate limit.
    pub fn finish(&self) {
        let event = match self.tracker.lock() {
            Ok(tracker) => {
                debug!(
                    bytes = tracker.progress().transferred_bytes,
                    elapsed_ms = tracker.elapsed().as_millis() as u64,
                    bytes_per_second = tracker.average_speed(),
                    "Transfer phase finished"
                );
                ProgressEvent::Transfer(tracker.progress().clone())
            }
            Err(_) => return,
        };
        if let Ok(mut reporter) = self.reporter.lock() {
            reporter.finish(event);
        }
    }
}

/// Everything needed to fetch one file.
pub struct FetchRequest<'a> {
    pub relative_path: &'a str,
    pub size: u64,
    pub expected: &'a Digest,
}

pub struct Fetcher<'a> {
    pub remote: &'a dyn RemoteCatalog,
    pub local_root: &'a Path,
    pub algorithm: DigestAlgorithm,
    pub chunk_size: usize,
    pub retry: &'a RetryPolicy,
    pub cancel: &'a CancellationToken,
    pub meter: &'a TransferMeter,
    /// Longest wait for the next chunk before the request counts as dropped.
    pub stall_timeout: Duration,
}

impl Fetcher<'_> {
    /// Download, verify and move one file into place. A digest mismatch is
    /// retried once from scratch before it is reported.
    pub async fn fetch(&self, request: &FetchRequest<'_>) -> Result<u64> {
        if !is_safe_relative_path(request.relative_path) {
            return Err(SyncError::UnsafePath(request.relative_path.to_string()));
        }
        let dest = self.local_root.join(request.relative_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::from_io(e, request.relative_path))?;
        }
        let partial = partial_path(&dest);

        let mut received = 0u64;
        let mut attempt = 0;
        loop {
            attempt += 1;
            received += self.download(request, &partial).await?;

            let actual = self.verify(&partial).await?;
            if &actual == request.expected {
                tokio::fs::rename(&partial, &dest)
                    .await
                    .map_err(|e| SyncError::from_io(e, request.relative_path))?;
                debug!(path = request.relative_path, bytes = received, "File reconciled");
                return Ok(received);
            }

            discard_partial(&partial, request.relative_path).await?;
            if attempt >= 2 {
                return Err(SyncError::ChecksumMismatch {
                    path: request.relative_path.to_string(),
                    expected: request.expected.to_hex(),
                    actual: actual.to_hex(),
                });
            }
            warn!(
                path = request.relative_path,
                "Digest mismatch after transfer, downloading again"
            );
        }
    }

    /// Bring the partial file up to `request.size` bytes, resuming across
    /// retried requests. Returns the bytes received over the network.
    async fn download(&self, request: &FetchRequest<'_>, partial: &Path) -> Result<u64> {
        let received = AtomicU64::new(0);
        let counter = &received;
        self.retry
            .run("file-data", self.cancel, || async move {
                self.download_once(request, partial, counter).await
            })
            .await?;
        Ok(received.load(Ordering::Relaxed))
    }

    async fn download_once(
        &self,
        request: &FetchRequest<'_>,
        partial: &Path,
        received: &AtomicU64,
    ) -> Result<()> {
        let path = request.relative_path;
        let mut have = match tokio::fs::metadata(partial).await {
            Ok(m) => m.len(),
            Err(_) => 0,
        };
        if have > request.size {
            tokio::fs::remove_file(partial)
                .await
                .map_err(|e| SyncError::from_io(e, path))?;
            have = 0;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(partial)
            .await
            .map_err(|e| SyncError::from_io(e, path))?;

        if have == request.size {
            return Ok(());
        }
        if have > 0 {
            debug!(path, offset = have, "Resuming partial download");
        }

        let mut stream = self
            .remote
            .data(path, have, Some(request.size - have))
            .await?;

        let mut written = 0u64;
        loop {
            tokio::select! {
                chunk = tokio::time::timeout(self.stall_timeout, stream.next()) => match chunk {
                    Err(_) => {
                        file.flush().await?;
                        return Err(SyncError::NetworkFailure(format!(
                            "{}: no data for {}s",
                            path,
                            self.stall_timeout.as_secs_f64()
                        )));
                    }
                    Ok(Some(Ok(bytes))) => {
                        let room = request.size - have - written;
                        let take = (bytes.len() as u64).min(room) as usize;
                        file.write_all(&bytes[..take]).await?;
                        written += take as u64;
                        received.fetch_add(take as u64, Ordering::Relaxed);
                        self.meter.add_bytes(take as u64);
                    }
                    Ok(Some(Err(e))) => {
                        file.flush().await?;
                        return Err(e);
                    }
                    Ok(None) => break,
                },
                _ = self.cancel.cancelled() => {
                    file.flush().await?;
                    return Err(SyncError::Cancelled);
                }
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        if have + written < request.size {
            return Err(SyncError::NetworkFailure(format!(
                "{}: stream ended at {} of {} bytes",
                path,
                have + written,
                request.size
            )));
        }
        Ok(())
    }

    async fn verify(&self, partial: &Path) -> Result<Digest> {
        let partial = partial.to_path_buf();
        let algorithm = self.algorithm;
        let chunk_size = self.chunk_size;
        let (digest, _) =
            tokio::task::spawn_blocking(move || digest_file(&partial, algorithm, chunk_size))
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;
        Ok(digest)
    }
}

/// Remove a partial file so the next attempt starts from byte zero.
async fn discard_partial(partial: &Path, relative_path: &str) -> Result<()> {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::from_io(e, relative_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::MemoryRemote;
    use std::fs;
    use tempfile::TempDir;

    const ALG: DigestAlgorithm = DigestAlgorithm::Sha256;

    async fn fetch_one(
        remote: &MemoryRemote,
        root: &Path,
        path: &str,
        expected: &Digest,
        size: u64,
        retry: RetryPolicy,
    ) -> Result<u64> {
        let cancel = CancellationToken::new();
        let meter = TransferMeter::new(size, 1, ProgressReporter::silent());
        let fetcher = Fetcher {
            remote,
            local_root: root,
            algorithm: ALG,
            chunk_size: 4,
            retry: &retry,
            cancel: &cancel,
            meter: &meter,
            stall_timeout: Duration::from_secs(5),
        };
        fetcher
            .fetch(&FetchRequest {
                relative_path: path,
                size,
                expected,
            })
            .await
    }

    #[test]
    fn test_partial_naming() {
        assert_eq!(
            partial_path(Path::new("/m/dir/photo.jpg")),
            Path::new("/m/dir/.photo.jpg.sync-partial")
        );
        assert!(is_partial_path("dir/.photo.jpg.sync-partial"));
        assert!(!is_partial_path("dir/photo.jpg"));
        assert!(!is_partial_path("notes.sync-partial"));
    }

    #[tokio::test]
    async fn test_fetch_creates_parents_and_renames() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"the quick brown fox";
        let remote = MemoryRemote::with_files(&[("a/b/fox.txt", content)]);

        let bytes = fetch_one(
            &remote,
            temp_dir.path(),
            "a/b/fox.txt",
            &ALG.digest_bytes(content),
            content.len() as u64,
            RetryPolicy::immediate(1),
        )
        .await
        .unwrap();

        assert_eq!(bytes, content.len() as u64);
        assert_eq!(fs::read(temp_dir.path().join("a/b/fox.txt")).unwrap(), content);
        assert!(!temp_dir.path().join("a/b/.fox.txt.sync-partial").exists());
    }

    #[tokio::test]
    async fn test_resumes_from_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"0123456789abcdef";
        let remote = MemoryRemote::with_files(&[("f.bin", content)]);
        fs::write(temp_dir.path().join(".f.bin.sync-partial"), &content[..10]).unwrap();

        let bytes = fetch_one(
            &remote,
            temp_dir.path(),
            "f.bin",
            &ALG.digest_bytes(content),
            content.len() as u64,
            RetryPolicy::immediate(1),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 6);
        assert_eq!(fs::read(temp_dir.path().join("f.bin")).unwrap(), content);
    }

    #[tokio::test]
    async fn test_corrupt_transfer_never_reaches_final_name() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"good bytes";
        let remote = MemoryRemote::with_files(&[("f.txt", content)]);
        remote
            .corrupt
            .lock()
            .unwrap()
            .insert("f.txt".to_string(), b"evil bytes".to_vec());

        let result = fetch_one(
            &remote,
            temp_dir.path(),
            "f.txt",
            &ALG.digest_bytes(content),
            content.len() as u64,
            RetryPolicy::immediate(1),
        )
        .await;

        assert!(matches!(result, Err(SyncError::ChecksumMismatch { .. })));
        assert_eq!(remote.data_calls.load(Ordering::SeqCst), 2);
        assert!(!temp_dir.path().join("f.txt").exists());
        assert!(!temp_dir.path().join(".f.txt.sync-partial").exists());
    }

    #[tokio::test]
    async fn test_network_failure_keeps_partial() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"some content";
        let mut remote = MemoryRemote::with_files(&[("f.txt", content)]);
        remote.fail_data_after = Some(0);

        let result = fetch_one(
            &remote,
            temp_dir.path(),
            "f.txt",
            &ALG.digest_bytes(content),
            content.len() as u64,
            RetryPolicy::immediate(3),
        )
        .await;

        assert!(matches!(result, Err(SyncError::NetworkFailure(_))));
        assert_eq!(remote.data_calls.load(Ordering::SeqCst), 3);
        assert!(!temp_dir.path().join("f.txt").exists());
    }

    #[tokio::test]
    async fn test_mismatch_retry_downloads_from_scratch() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"good bytes";
        let mut remote = MemoryRemote::with_files(&[("f.txt", content)]);
        remote.corrupt_once = true;
        remote
            .corrupt
            .lock()
            .unwrap()
            .insert("f.txt".to_string(), b"evil bytes".to_vec());

        let bytes = fetch_one(
            &remote,
            temp_dir.path(),
            "f.txt",
            &ALG.digest_bytes(content),
            content.len() as u64,
            RetryPolicy::immediate(1),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 2 * content.len() as u64);
        assert_eq!(remote.data_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fs::read(temp_dir.path().join("f.txt")).unwrap(), content);
    }

    #[tokio::test]
    async fn test_stalled_stream_is_a_network_failure() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"0123456789abcdef";
        let mut remote = MemoryRemote::with_files(&[("f.bin", content)]);
        remote.stall_after_first_chunk = true;

        let cancel = CancellationToken::new();
        let meter = TransferMeter::new(content.len() as u64, 1, ProgressReporter::silent());
        let retry = RetryPolicy::immediate(2);
        let expected = ALG.digest_bytes(content);
        let fetcher = Fetcher {
            remote: &remote,
            local_root: temp_dir.path(),
            algorithm: ALG,
            chunk_size: 4,
            retry: &retry,
            cancel: &cancel,
            meter: &meter,
            stall_timeout: Duration::from_millis(50),
        };

        let result = fetcher
            .fetch(&FetchRequest {
                relative_path: "f.bin",
                size: content.len() as u64,
                expected: &expected,
            })
            .await;

        assert!(matches!(result, Err(SyncError::NetworkFailure(_))));
        assert_eq!(remote.data_calls.load(Ordering::SeqCst), 2);
        // each attempt kept the chunk it got before the stall
        let partial = temp_dir.path().join(".f.bin.sync-partial");
        assert_eq!(fs::read(partial).unwrap(), &content[..8]);
        assert!(!temp_dir.path().join("f.bin").exists());
    }

    #[tokio::test]
    async fn test_unsafe_path_is_rejected_before_touching_disk() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("mirror");
        let remote = MemoryRemote::with_files(&[("../x.txt", b"x")]);

        let result = fetch_one(
            &remote,
            &root,
            "../x.txt",
            &ALG.digest_bytes(b"x"),
            1,
            RetryPolicy::immediate(1),
        )
        .await;

        assert!(matches!(result, Err(SyncError::UnsafePath(_))));
        assert_eq!(remote.data_calls.load(Ordering::SeqCst), 0);
        assert!(!temp_dir.path().join("x.txt").exists());
    }
}
