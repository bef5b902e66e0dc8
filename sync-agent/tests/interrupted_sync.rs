//! End-to-end sync against a mounted-directory remote whose data requests
//! fail on demand.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sync_agent::digest::DigestAlgorithm;
use sync_agent::protocol::{ListEntry, SumResponse};
use sync_agent::remote::{ByteStream, LocalRemote, RemoteCatalog};
use sync_agent::sync::{RetryPolicy, RunState, SyncDriver, SyncOptions};
use sync_agent::{Result, SyncError};
use tempfile::TempDir;

/// Serves `healthy_requests` data requests normally, then cuts every stream
/// after `cut_after` bytes.
struct FlakyRemote {
    inner: LocalRemote,
    healthy_requests: usize,
    cut_after: usize,
    data_calls: AtomicUsize,
}

#[async_trait]
impl RemoteCatalog for FlakyRemote {
    fn describe(&self) -> String {
        format!("flaky {}", self.inner.describe())
    }

    async fn list(&self) -> Result<Vec<ListEntry>> {
        self.inner.list().await
    }

    async fn sum(&self, path: &str, algorithm: DigestAlgorithm) -> Result<SumResponse> {
        self.inner.sum(path, algorithm).await
    }

    async fn data(&self, path: &str, offset: u64, length: Option<u64>) -> Result<ByteStream> {
        let served = self.data_calls.fetch_add(1, Ordering::SeqCst);
        let stream = self.inner.data(path, offset, length).await?;
        if served < self.healthy_requests {
            return Ok(stream);
        }

        let chunks: Vec<Bytes> = stream.try_collect().await?;
        let all = chunks.concat();
        let head = Bytes::copy_from_slice(&all[..self.cut_after.min(all.len())]);
        let items: Vec<Result<Bytes>> = vec![
            Ok(head),
            Err(SyncError::NetworkFailure("connection reset by peer".into())),
        ];
        Ok(futures_util::stream::iter(items).boxed())
    }
}

fn source_tree(root: &Path) {
    fs::create_dir_all(root.join("albums/2023")).unwrap();
    fs::create_dir_all(root.join("albums/2024")).unwrap();
    fs::write(root.join("index.txt"), b"five files in total").unwrap();
    fs::write(root.join("albums/cover.jpg"), vec![7u8; 4096]).unwrap();
    fs::write(root.join("albums/2023/a.raw"), vec![1u8; 10_000]).unwrap();
    fs::write(root.join("albums/2023/b.raw"), vec![2u8; 20_000]).unwrap();
    fs::write(root.join("albums/2024/c.raw"), vec![3u8; 30_000]).unwrap();
}

fn options() -> SyncOptions {
    SyncOptions {
        retry: RetryPolicy::immediate(2),
        chunk_size: 4096,
        ..SyncOptions::default()
    }
}

fn partial_files(root: &Path) -> Vec<String> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".sync-partial"))
        .map(|e| e.path().display().to_string())
        .collect()
}

#[tokio::test]
async fn interrupted_sync_resumes_on_next_run() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    let mirror = temp_dir.path().join("mirror");
    source_tree(&source);

    // first run: two files succeed, then every stream breaks after 5000 bytes
    let flaky = Arc::new(FlakyRemote {
        inner: LocalRemote::new(&source).with_chunk_size(4096),
        healthy_requests: 2,
        cut_after: 5_000,
        data_calls: AtomicUsize::new(0),
    });
    let report = SyncDriver::new("photos", &mirror, flaky)
        .with_options(options())
        .run()
        .await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failed_during, Some(RunState::Transferring));
    assert_eq!(report.fetch_planned, 5);
    assert_eq!(report.fetched, 2);

    // both attempts at c.raw appended to the same partial file, and nothing
    // incomplete is visible under its final name
    assert!(mirror.join("albums/2023/b.raw").exists());
    assert!(!mirror.join("albums/2024/c.raw").exists());
    let partials = partial_files(&mirror);
    assert_eq!(partials.len(), 1, "{:?}", partials);
    assert!(partials[0].ends_with(".c.raw.sync-partial"));
    assert_eq!(fs::metadata(&partials[0]).unwrap().len(), 10_000);

    // second run against a healthy remote finishes the job
    let healthy = Arc::new(LocalRemote::new(&source));
    let report = SyncDriver::new("photos", &mirror, healthy)
        .with_options(options())
        .run()
        .await;

    assert!(report.is_complete_success(), "{:?}", report);
    assert_eq!(report.in_sync, 2);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.bytes_transferred, (30_000 - 10_000) + 4096 + 19);
    assert!(partial_files(&mirror).is_empty());

    for path in [
        "index.txt",
        "albums/cover.jpg",
        "albums/2023/a.raw",
        "albums/2023/b.raw",
        "albums/2024/c.raw",
    ] {
        assert_eq!(
            fs::read(mirror.join(path)).unwrap(),
            fs::read(source.join(path)).unwrap(),
            "{} differs",
            path
        );
    }

    // third run has nothing to do
    let report = SyncDriver::new("photos", &mirror, Arc::new(LocalRemote::new(&source)))
        .with_options(options())
        .run()
        .await;
    assert_eq!(report.fetch_planned, 0);
    assert_eq!(report.in_sync, 5);
}

#[tokio::test]
async fn cancelled_sync_never_exposes_partial_files() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    let mirror = temp_dir.path().join("mirror");
    source_tree(&source);

    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    let callback: sync_agent::transfer::ProgressCallback = Arc::new(move |event| {
        if let sync_agent::transfer::ProgressEvent::Transfer(_) = event {
            trigger.cancel();
        }
    });

    let report = SyncDriver::new("photos", &mirror, Arc::new(LocalRemote::new(&source)))
        .with_options(SyncOptions {
            progress_interval: std::time::Duration::ZERO,
            ..options()
        })
        .with_cancel(cancel)
        .with_progress(callback)
        .run()
        .await;

    assert_eq!(report.state, RunState::Cancelled);
    assert!(report.fetched < 5);
    for entry in walkdir::WalkDir::new(&mirror).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && !entry.file_name().to_string_lossy().starts_with('.') {
            let relative = entry.path().strip_prefix(&mirror).unwrap();
            assert_eq!(
                fs::read(entry.path()).unwrap(),
                fs::read(source.join(relative)).unwrap()
            );
        }
    }
}
