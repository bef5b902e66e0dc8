//! Job tracking for running sync runs.

use crate::sync::SyncReport;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct RunHandle {
    resource: String,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunningSync {
    pub run_id: Uuid,
    pub resource: String,
}

/// Tracks running syncs, one per resource at most, and keeps the last report
/// of every resource.
#[derive(Clone, Default)]
pub struct JobTracker {
    runs: Arc<RwLock<HashMap<Uuid, RunHandle>>>,
    last_reports: Arc<RwLock<HashMap<String, SyncReport>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run. Returns false if `resource` already has one running.
    pub async fn register(&self, run_id: Uuid, resource: &str, cancel: CancellationToken) -> bool {
        let mut runs = self.runs.write().await;
        if runs.values().any(|r| r.resource == resource) {
            return false;
        }
        runs.insert(
            run_id,
            RunHandle {
                resource: resource.to_string(),
                cancel,
            },
        );
        true
    }

    /// Cancel a running sync by its ID. The run stays registered until it
    /// reports back through [`JobTracker::complete`].
    pub async fn cancel(&self, run_id: &Uuid) -> bool {
        let runs = self.runs.read().await;
        match runs.get(run_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        let runs = self.runs.read().await;
        for handle in runs.values() {
            handle.cancel.cancel();
        }
    }

    /// Remove a finished run and store its report.
    pub async fn complete(&self, report: SyncReport) {
        self.runs.write().await.remove(&report.run_id);
        self.last_reports
            .write()
            .await
            .insert(report.resource.clone(), report);
    }

    pub async fn running(&self) -> Vec<RunningSync> {
        let runs = self.runs.read().await;
        let mut running: Vec<RunningSync> = runs
            .iter()
            .map(|(run_id, handle)| RunningSync {
                run_id: *run_id,
                resource: handle.resource.clone(),
            })
            .collect();
        running.sort_by(|a, b| a.resource.cmp(&b.resource));
        running
    }

    pub async fn running_count(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn last_reports(&self) -> HashMap<String, SyncReport> {
        self.last_reports.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RunState;

    #[tokio::test]
    async fn test_one_run_per_resource() {
        let tracker = JobTracker::new();
        assert!(tracker.register(Uuid::new_v4(), "photos", CancellationToken::new()).await);
        assert!(!tracker.register(Uuid::new_v4(), "photos", CancellationToken::new()).await);
        assert!(tracker.register(Uuid::new_v4(), "docs", CancellationToken::new()).await);
        assert_eq!(tracker.running_count().await, 2);
    }

    #[tokio::test]
    async fn test_cancel_and_complete() {
        let tracker = JobTracker::new();
        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        tracker.register(run_id, "photos", token.clone()).await;

        assert!(tracker.cancel(&run_id).await);
        assert!(token.is_cancelled());
        assert!(!tracker.cancel(&Uuid::new_v4()).await);

        let mut report = SyncReport::new(run_id, "photos");
        report.state = RunState::Cancelled;
        tracker.complete(report).await;

        assert_eq!(tracker.running_count().await, 0);
        assert_eq!(
            tracker.last_reports().await["photos"].state,
            RunState::Cancelled
        );
    }
}
