//! Diffing a local catalog against a remote listing.
//!
//! Sizes are compared first; only same-size pairs cost a digest round-trip,
//! because a size mismatch already proves the content differs. Once sizes
//! match, the digest is authoritative.

use super::report::FileFailure;
use super::retry::RetryPolicy;
use crate::catalog::Catalog;
use crate::digest::{Digest, DigestAlgorithm};
use crate::protocol::{is_safe_relative_path, ListEntry};
use crate::remote::RemoteCatalog;
use crate::utils::{Result, SyncError};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchReason {
    /// Present remotely, absent locally.
    Missing,
    SizeMismatch,
    /// Same size, different digest.
    DigestMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum SyncAction {
    Fetch(FetchReason),
    /// Local-only file removed because the operator enabled pruning.
    DeleteLocally,
    InSync,
    /// Local-only file left untouched and flagged for manual resolution.
    KeepLocal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub relative_path: String,
    pub action: SyncAction,
    /// Size on the remote side, when the file exists there.
    pub remote_size: Option<u64>,
    /// Remote digest, when one was fetched while diffing.
    pub remote_digest: Option<Digest>,
}

/// Per-path actions for one run, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub entries: Vec<PlanEntry>,
    /// Remote entries that could not be planned. They get no action.
    pub failures: Vec<FileFailure>,
}

impl SyncPlan {
    pub fn fetches(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, SyncAction::Fetch(_)))
    }

    pub fn count(&self, action: SyncAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches().count()
    }

    pub fn bytes_to_fetch(&self) -> u64 {
        self.fetches().filter_map(|e| e.remote_size).sum()
    }

    pub fn paths_with(&self, action: SyncAction) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .map(|e| e.relative_path.clone())
            .collect()
    }
}

/// Build the plan for `local` against `remote_files`, asking `remote` for
/// digests where sizes agree.
pub async fn build_plan(
    local: &Catalog,
    remote_files: &[ListEntry],
    remote: &dyn RemoteCatalog,
    algorithm: DigestAlgorithm,
    prune_local: bool,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<SyncPlan> {
    let mut failures = Vec::new();
    let mut remote_by_path: BTreeMap<&str, &ListEntry> = BTreeMap::new();
    for entry in remote_files {
        if is_safe_relative_path(&entry.path) {
            remote_by_path.insert(entry.path.as_str(), entry);
        } else {
            warn!(path = %entry.path, "Remote listed a path outside the resource, ignoring");
            failures.push(FileFailure::from_error(
                &entry.path,
                &SyncError::UnsafePath(entry.path.clone()),
            ));
        }
    }

    let mut entries = Vec::with_capacity(remote_by_path.len() + local.len());

    for (path, remote_entry) in &remote_by_path {
        let Some(record) = local.get(path) else {
            entries.push(PlanEntry {
                relative_path: path.to_string(),
                action: SyncAction::Fetch(FetchReason::Missing),
                remote_size: Some(remote_entry.size),
                remote_digest: None,
            });
            continue;
        };

        if record.size != remote_entry.size {
            entries.push(PlanEntry {
                relative_path: path.to_string(),
                action: SyncAction::Fetch(FetchReason::SizeMismatch),
                remote_size: Some(remote_entry.size),
                remote_digest: None,
            });
            continue;
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let sum = match retry
            .run("file-sum", cancel, || remote.sum(path, algorithm))
            .await
        {
            Ok(sum) => sum,
            // gone or unreadable since the listing; the local copy stays as is
            Err(e @ (SyncError::NotFound(_) | SyncError::AccessDenied(_))) => {
                warn!(path, error = %e, "Remote file could not be summed");
                failures.push(FileFailure::from_error(path, &e));
                continue;
            }
            Err(e) => return Err(e),
        };

        let action = if sum.size == record.size && sum.digest == record.digest {
            SyncAction::InSync
        } else {
            SyncAction::Fetch(FetchReason::DigestMismatch)
        };

        entries.push(PlanEntry {
            relative_path: path.to_string(),
            action,
            remote_size: Some(sum.size),
            remote_digest: Some(sum.digest),
        });
    }

    for record in local.records() {
        let path = record.relative_path.as_str();
        if remote_by_path.contains_key(path) || failures.iter().any(|f| f.relative_path == path) {
            continue;
        }
        entries.push(PlanEntry {
            relative_path: record.relative_path.clone(),
            action: if prune_local {
                SyncAction::DeleteLocally
            } else {
                SyncAction::KeepLocal
            },
            remote_size: None,
            remote_digest: None,
        });
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(SyncPlan { entries, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileRecord;
    use crate::remote::testing::MemoryRemote;
    use std::sync::atomic::Ordering;

    const ALG: DigestAlgorithm = DigestAlgorithm::Sha256;

    fn catalog(files: &[(&str, &[u8])]) -> Catalog {
        let mut catalog = Catalog::new("/local", Some(ALG));
        for (path, data) in files {
            catalog.insert(FileRecord {
                relative_path: path.to_string(),
                size: data.len() as u64,
                digest: ALG.digest_bytes(data),
                checked: true,
                mtime_ns: 0,
            });
        }
        catalog
    }

    async fn plan_for(local: &Catalog, remote: &MemoryRemote, prune: bool) -> SyncPlan {
        let listing = remote.list().await.unwrap();
        plan_listing(local, &listing, remote, prune).await
    }

    async fn plan_listing(
        local: &Catalog,
        listing: &[ListEntry],
        remote: &MemoryRemote,
        prune: bool,
    ) -> SyncPlan {
        build_plan(
            local,
            listing,
            remote,
            ALG,
            prune,
            &RetryPolicy::immediate(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_identical_catalogs_need_no_fetch() {
        let files: &[(&str, &[u8])] = &[("a.txt", b"alpha"), ("dir/b.txt", b"bravo")];
        let remote = MemoryRemote::with_files(files);
        let plan = plan_for(&catalog(files), &remote, false).await;

        assert_eq!(plan.fetch_count(), 0);
        assert_eq!(plan.count(SyncAction::InSync), 2);
    }

    #[tokio::test]
    async fn test_same_size_different_digest_is_fetched() {
        let remote = MemoryRemote::with_files(&[("a.txt", b"alpha")]);
        let plan = plan_for(&catalog(&[("a.txt", b"alpho")]), &remote, false).await;

        assert_eq!(
            plan.entries[0].action,
            SyncAction::Fetch(FetchReason::DigestMismatch)
        );
        assert_eq!(plan.entries[0].remote_digest, Some(ALG.digest_bytes(b"alpha")));
    }

    #[tokio::test]
    async fn test_size_mismatch_skips_digest_request() {
        let remote = MemoryRemote::with_files(&[("a.txt", b"alpha, longer")]);
        let plan = plan_for(&catalog(&[("a.txt", b"alpha")]), &remote, false).await;

        assert_eq!(
            plan.entries[0].action,
            SyncAction::Fetch(FetchReason::SizeMismatch)
        );
        assert_eq!(remote.sum_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_and_local_only() {
        let remote = MemoryRemote::with_files(&[("remote.txt", b"r")]);
        let local = catalog(&[("local.txt", b"l")]);

        let plan = plan_for(&local, &remote, false).await;
        assert_eq!(plan.paths_with(SyncAction::KeepLocal), vec!["local.txt"]);
        assert_eq!(
            plan.paths_with(SyncAction::Fetch(FetchReason::Missing)),
            vec!["remote.txt"]
        );
        assert_eq!(plan.bytes_to_fetch(), 1);

        let pruned = plan_for(&local, &remote, true).await;
        assert_eq!(pruned.paths_with(SyncAction::DeleteLocally), vec!["local.txt"]);
    }

    #[tokio::test]
    async fn test_paths_escaping_the_root_are_never_planned() {
        let remote = MemoryRemote::with_files(&[
            ("../escaped.txt", b"outside"),
            ("/etc/cron.d/job", b"outside"),
            ("ok.txt", b"fine"),
        ]);
        let plan = plan_for(&catalog(&[]), &remote, false).await;

        assert_eq!(
            plan.paths_with(SyncAction::Fetch(FetchReason::Missing)),
            vec!["ok.txt"]
        );
        assert_eq!(plan.failures.len(), 2);
        assert!(plan
            .failures
            .iter()
            .all(|f| f.kind == crate::sync::FailureKind::UnsafePath));
    }

    #[tokio::test]
    async fn test_file_removed_after_listing_is_a_per_file_failure() {
        let remote = MemoryRemote::with_files(&[("a.txt", b"alpha"), ("b.txt", b"bravo")]);
        let listing = remote.list().await.unwrap();
        remote.files.lock().unwrap().remove("a.txt");

        let local = catalog(&[("a.txt", b"alpha"), ("b.txt", b"bravo")]);
        let plan = plan_listing(&local, &listing, &remote, true).await;

        assert_eq!(plan.paths_with(SyncAction::InSync), vec!["b.txt"]);
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].relative_path, "a.txt");
        assert_eq!(plan.failures[0].kind, crate::sync::FailureKind::NotFound);
        // not pruned either: the file still counts as listed
        assert!(plan.paths_with(SyncAction::DeleteLocally).is_empty());
    }
}
