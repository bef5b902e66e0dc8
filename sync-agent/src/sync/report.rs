//! Outcome of a sync run.

use crate::fs::WalkIssue;
use crate::utils::SyncError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Phase of a run. A run moves forward through the phases and ends in one of
/// the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Scanning,
    Listing,
    Diffing,
    Transferring,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AccessDenied,
    ChecksumMismatch,
    NotFound,
    UnsafePath,
    Io,
}

/// A file the run could not reconcile. Other files are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub relative_path: String,
    pub kind: FailureKind,
    pub message: String,
}

impl FileFailure {
    pub fn from_error(relative_path: &str, error: &SyncError) -> Self {
        let kind = match error {
            SyncError::AccessDenied(_) => FailureKind::AccessDenied,
            SyncError::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            SyncError::NotFound(_) => FailureKind::NotFound,
            SyncError::UnsafePath(_) => FailureKind::UnsafePath,
            _ => FailureKind::Io,
        };
        Self {
            relative_path: relative_path.to_string(),
            kind,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub resource: String,
    pub state: RunState,
    /// Phase in which a failed or cancelled run stopped.
    pub failed_during: Option<RunState>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub local_files: usize,
    pub remote_files: usize,
    pub in_sync: usize,
    pub fetch_planned: usize,
    pub fetched: usize,
    pub deleted_locally: usize,
    /// Local-only files kept for manual resolution.
    pub local_only: Vec<String>,
    pub bytes_transferred: u64,

    pub failures: Vec<FileFailure>,
    /// Entries the local scan could not read.
    pub skipped: Vec<WalkIssue>,
}

impl SyncReport {
    pub fn new(run_id: Uuid, resource: &str) -> Self {
        Self {
            run_id,
            resource: resource.to_string(),
            state: RunState::Scanning,
            failed_during: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            local_files: 0,
            remote_files: 0,
            in_sync: 0,
            fetch_planned: 0,
            fetched: 0,
            deleted_locally: 0,
            local_only: Vec::new(),
            bytes_transferred: 0,
            failures: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Every remote file is present locally with matching content.
    pub fn is_complete_success(&self) -> bool {
        self.state == RunState::Done && self.failures.is_empty() && self.fetched == self.fetch_planned
    }

    pub(crate) fn finish(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn abort(&mut self, error: &SyncError) {
        let during = self.state;
        self.failed_during = Some(during);
        self.error = Some(error.to_string());
        if matches!(error, SyncError::Cancelled) {
            self.finish(RunState::Cancelled);
        } else {
            self.finish(RunState::Failed);
        }
    }
}
