//! Three-phase reconciliation of one local directory against one remote
//! resource: scan and list, diff by digest, fetch what differs.

use super::fetch::{is_partial_path, FetchRequest, Fetcher, TransferMeter};
use super::plan::{build_plan, SyncAction, SyncPlan};
use super::report::{FileFailure, RunState, SyncReport};
use super::retry::RetryPolicy;
use crate::catalog::{Catalog, CatalogBuilder};
use crate::digest::{DigestAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::fs::WalkOptions;
use crate::remote::RemoteCatalog;
use crate::transfer::progress::DEFAULT_REPORT_INTERVAL;
use crate::transfer::{ProgressCallback, ProgressReporter};
use crate::utils::{Result, SyncError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub algorithm: DigestAlgorithm,
    pub chunk_size: usize,
    /// Delete local files the remote does not have.
    pub prune_local: bool,
    pub retry: RetryPolicy,
    pub walk_options: WalkOptions,
    pub progress_interval: Duration,
    /// Longest silence on a data stream before the request is retried.
    pub stall_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            chunk_size: DEFAULT_CHUNK_SIZE,
            prune_local: false,
            retry: RetryPolicy::default(),
            walk_options: WalkOptions::default(),
            progress_interval: DEFAULT_REPORT_INTERVAL,
            stall_timeout: Duration::from_secs(60),
        }
    }
}

/// Errors that end the whole run instead of a single file.
fn is_fatal(error: &SyncError) -> bool {
    matches!(
        error,
        SyncError::NetworkFailure(_)
            | SyncError::Http(_)
            | SyncError::Unauthorized
            | SyncError::Protocol(_)
            | SyncError::InconsistentFilesystemState(_)
            | SyncError::Cancelled
    )
}

pub struct SyncDriver {
    resource: String,
    local_root: PathBuf,
    remote: Arc<dyn RemoteCatalog>,
    options: SyncOptions,
    cancel: CancellationToken,
    callback: Option<ProgressCallback>,
}

impl SyncDriver {
    pub fn new(
        resource: impl Into<String>,
        local_root: impl Into<PathBuf>,
        remote: Arc<dyn RemoteCatalog>,
    ) -> Self {
        Self {
            resource: resource.into(),
            local_root: local_root.into(),
            remote,
            options: SyncOptions::default(),
            cancel: CancellationToken::new(),
            callback: None,
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub async fn run(&self) -> SyncReport {
        self.run_with_id(Uuid::new_v4()).await
    }

    /// Run once. Never returns an error: the outcome, including fatal
    /// failures, is in the report.
    pub async fn run_with_id(&self, run_id: Uuid) -> SyncReport {
        let mut report = SyncReport::new(run_id, &self.resource);
        info!(
            %run_id,
            resource = %self.resource,
            remote = %self.remote.describe(),
            local = %self.local_root.display(),
            "Sync started"
        );
        if !self.options.algorithm.is_cryptographic() {
            warn!(
                algorithm = %self.options.algorithm,
                "Digest is not collision resistant, deliberate tampering goes unnoticed"
            );
        }

        match self.execute(&mut report).await {
            Ok(()) => {
                report.finish(RunState::Done);
                info!(
                    %run_id,
                    resource = %self.resource,
                    fetched = report.fetched,
                    in_sync = report.in_sync,
                    failures = report.failures.len(),
                    bytes = report.bytes_transferred,
                    "Sync finished"
                );
            }
            Err(SyncError::Cancelled) => {
                report.abort(&SyncError::Cancelled);
                warn!(%run_id, resource = %self.resource, during = ?report.failed_during, "Sync cancelled");
            }
            Err(e) => {
                report.abort(&e);
                error!(%run_id, resource = %self.resource, during = ?report.failed_during, error = %e, "Sync failed");
            }
        }
        report
    }

    async fn execute(&self, report: &mut SyncReport) -> Result<()> {
        report.state = RunState::Scanning;
        let local = self.scan(report).await?;

        report.state = RunState::Listing;
        let remote = self.remote.as_ref();
        let listing = self
            .options
            .retry
            .run("file-list", &self.cancel, || remote.list())
            .await?;
        report.remote_files = listing.len();
        debug!(resource = %self.resource, files = listing.len(), "Remote listing received");

        report.state = RunState::Diffing;
        let plan = build_plan(
            &local,
            &listing,
            remote,
            self.options.algorithm,
            self.options.prune_local,
            &self.options.retry,
            &self.cancel,
        )
        .await?;
        report.in_sync = plan.count(SyncAction::InSync);
        report.fetch_planned = plan.fetch_count();
        report.local_only = plan.paths_with(SyncAction::KeepLocal);
        report.failures.extend(plan.failures.iter().cloned());
        if !report.local_only.is_empty() {
            warn!(
                resource = %self.resource,
                count = report.local_only.len(),
                "Local files missing on the remote were kept"
            );
        }

        report.state = RunState::Transferring;
        self.transfer(&plan, report).await
    }

    async fn scan(&self, report: &mut SyncReport) -> Result<Catalog> {
        tokio::fs::create_dir_all(&self.local_root)
            .await
            .map_err(|e| SyncError::from_io(e, &self.local_root.display().to_string()))?;

        let builder = CatalogBuilder::new(&self.local_root)
            .hashed(self.options.algorithm)
            .chunk_size(self.options.chunk_size)
            .walk_options(self.options.walk_options.clone())
            .cancel(self.cancel.clone())
            .reporter(ProgressReporter::new(
                self.callback.clone(),
                self.options.progress_interval,
            ));

        let outcome = tokio::task::spawn_blocking(move || builder.build())
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;

        let mut catalog = outcome.catalog;
        let partials: Vec<String> = catalog
            .records()
            .filter(|r| is_partial_path(&r.relative_path))
            .map(|r| r.relative_path.clone())
            .collect();
        for path in &partials {
            catalog.remove(path);
        }

        report.local_files = catalog.len();
        report.skipped = outcome.issues;
        Ok(catalog)
    }

    async fn transfer(&self, plan: &SyncPlan, report: &mut SyncReport) -> Result<()> {
        let meter = TransferMeter::new(
            plan.bytes_to_fetch(),
            plan.fetch_count(),
            ProgressReporter::new(self.callback.clone(), self.options.progress_interval),
        );
        let fetcher = Fetcher {
            remote: self.remote.as_ref(),
            local_root: &self.local_root,
            algorithm: self.options.algorithm,
            chunk_size: self.options.chunk_size,
            retry: &self.options.retry,
            cancel: &self.cancel,
            meter: &meter,
            stall_timeout: self.options.stall_timeout,
        };

        let result = self.apply(plan, &fetcher, &meter, report).await;
        report.bytes_transferred = meter.transferred_bytes();
        meter.finish();
        result
    }

    async fn apply(
        &self,
        plan: &SyncPlan,
        fetcher: &Fetcher<'_>,
        meter: &TransferMeter,
        report: &mut SyncReport,
    ) -> Result<()> {
        let remote = self.remote.as_ref();
        let algorithm = self.options.algorithm;

        for entry in &plan.entries {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let path = entry.relative_path.as_str();

            match entry.action {
                SyncAction::Fetch(reason) => {
                    meter.start_file(path);
                    debug!(path, ?reason, "Fetching");

                    let outcome = async {
                        let (size, expected) = match (&entry.remote_digest, entry.remote_size) {
                            (Some(digest), Some(size)) => (size, digest.clone()),
                            _ => {
                                let sum = self
                                    .options
                                    .retry
                                    .run("file-sum", &self.cancel, || remote.sum(path, algorithm))
                                    .await?;
                                (sum.size, sum.digest)
                            }
                        };
                        fetcher
                            .fetch(&FetchRequest {
                                relative_path: path,
                                size,
                                expected: &expected,
                            })
                            .await
                    }
                    .await;

                    match outcome {
                        Ok(_) => {
                            report.fetched += 1;
                            meter.finish_file();
                        }
                        Err(e) if is_fatal(&e) => return Err(e),
                        Err(e) => {
                            warn!(path, error = %e, "File could not be reconciled");
                            report.failures.push(FileFailure::from_error(path, &e));
                        }
                    }
                }
                SyncAction::DeleteLocally => {
                    match tokio::fs::remove_file(self.local_root.join(path)).await {
                        Ok(()) => {
                            info!(path, "Removed local-only file");
                            report.deleted_locally += 1;
                        }
                        Err(e) => {
                            let e = SyncError::from_io(e, path);
                            warn!(path, error = %e, "Could not remove local-only file");
                            report.failures.push(FileFailure::from_error(path, &e));
                        }
                    }
                }
                SyncAction::InSync | SyncAction::KeepLocal => {}
            }
        }
        Ok(())
    }
}
