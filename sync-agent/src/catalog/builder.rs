//! Folds walker output into a [`Catalog`].

use super::{Catalog, FileRecord};
use crate::digest::{digest_file, Digest, DigestAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::fs::{FileStamp, WalkIssue, WalkOptions, Walker};
use crate::transfer::{ProgressEvent, ProgressReporter, ScanProgress};
use crate::utils::{Result, SyncError};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a scan: the catalog plus everything that was skipped.
#[derive(Debug)]
pub struct ScanOutcome {
    pub catalog: Catalog,
    pub issues: Vec<WalkIssue>,
}

/// Builds a catalog of one directory tree.
///
/// ```no_run
/// use sync_agent::catalog::CatalogBuilder;
/// use sync_agent::digest::DigestAlgorithm;
/// use std::path::Path;
///
/// let outcome = CatalogBuilder::new(Path::new("/data"))
///     .hashed(DigestAlgorithm::Sha256)
///     .build()
///     .unwrap();
/// println!("{} files", outcome.catalog.len());
/// ```
pub struct CatalogBuilder {
    root: PathBuf,
    algorithm: Option<DigestAlgorithm>,
    include_folders: bool,
    chunk_size: usize,
    walk_options: WalkOptions,
    cancel: Option<CancellationToken>,
    reporter: ProgressReporter,
}

impl CatalogBuilder {
    /// Structural scan of `root` (sizes only) until `hashed` is called.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            algorithm: None,
            include_folders: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            walk_options: WalkOptions::default(),
            cancel: None,
            reporter: ProgressReporter::silent(),
        }
    }

    /// Digest every file with `algorithm`.
    pub fn hashed(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Record folders as well as files.
    pub fn with_folders(mut self) -> Self {
        self.include_folders = true;
        self
    }

    /// Read buffer size when hashing.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn walk_options(mut self, options: WalkOptions) -> Self {
        self.walk_options = options;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn build(mut self) -> Result<ScanOutcome> {
        let mut walker = Walker::new(&self.root, self.walk_options.clone())?;
        if let Some(token) = self.cancel.clone() {
            walker = walker.with_cancel(token);
        }

        let mut catalog = Catalog::new(self.root.clone(), self.algorithm);
        let mut issues = Vec::new();
        let mut progress = ScanProgress::default();
        let mut listed = walker.folders_listed();

        while let Some(entry) = walker.next() {
            let entry = entry?;

            // a new listing means the previous folder has been drained
            if walker.folders_listed() != listed {
                if listed > 0 {
                    progress.folders_scanned = listed;
                    self.reporter.report(ProgressEvent::Scan(progress.clone()));
                }
                listed = walker.folders_listed();
            }

            if entry.is_directory {
                if self.include_folders {
                    catalog.insert_folder(entry.relative_path);
                }
                continue;
            }

            match self.record_for(&entry.relative_path) {
                Ok(record) => {
                    progress.files_scanned += 1;
                    progress.bytes_scanned += record.size;
                    catalog.insert(record);
                }
                Err(SyncError::AccessDenied(path)) => {
                    warn!(path = %path, "Access denied while reading file, skipping");
                    issues.push(WalkIssue {
                        relative_path: path,
                        message: "access denied".to_string(),
                    });
                }
                Err(SyncError::NotFound(path)) => {
                    debug!(path = %path, "File vanished during scan");
                    issues.push(WalkIssue {
                        relative_path: path,
                        message: "vanished during scan".to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        progress.folders_scanned = walker.folders_listed();
        self.reporter.finish(ProgressEvent::Scan(progress.clone()));

        let mut all_issues = walker.into_issues();
        all_issues.extend(issues);

        info!(
            root = %self.root.display(),
            files = catalog.len(),
            bytes = catalog.total_bytes(),
            folders = progress.folders_scanned,
            issues = all_issues.len(),
            "Catalog scan complete"
        );

        Ok(ScanOutcome {
            catalog,
            issues: all_issues,
        })
    }

    fn record_for(&self, relative_path: &str) -> Result<FileRecord> {
        let path = self.root.join(relative_path);
        let stamp =
            FileStamp::from_path(&path).map_err(|e| SyncError::from_io(e, relative_path))?;

        let (digest, size, checked) = match self.algorithm {
            Some(algorithm) => {
                let (digest, read) = digest_file(&path, algorithm, self.chunk_size)
                    .map_err(|e| SyncError::from_io(e, relative_path))?;
                (digest, read, true)
            }
            None => (Digest::empty(), stamp.size, false),
        };

        Ok(FileRecord {
            relative_path: relative_path.to_string(),
            size,
            digest,
            checked,
            mtime_ns: stamp.mtime_ns,
        })
    }
}
