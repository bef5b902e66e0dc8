//! Path-keyed catalogs of file records.
//!
//! A [`Catalog`] is one side's view of a tree: every file keyed by its
//! relative path, with size and digest. The client builds one for its local
//! mirror, the server builds one per resource root, and the duplicate finder
//! groups the records of a single catalog.

pub mod builder;
pub mod duplicates;

pub use builder::{CatalogBuilder, ScanOutcome};
pub use duplicates::{find_duplicate_files, find_duplicate_folders, DuplicateFolderGroup, DuplicateGroup};

use crate::digest::{Digest, DigestAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One file in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_path: String,
    pub size: u64,
    pub digest: Digest,
    /// Digest computed from disk during this scan. `false` for structural
    /// listings, whose digest is empty.
    pub checked: bool,
    pub mtime_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    root: PathBuf,
    algorithm: Option<DigestAlgorithm>,
    records: BTreeMap<String, FileRecord>,
    folders: BTreeSet<String>,
}

impl Catalog {
    /// Empty catalog for `root`. `algorithm` is `None` for structural listings.
    pub fn new(root: impl Into<PathBuf>, algorithm: Option<DigestAlgorithm>) -> Self {
        Self {
            root: root.into(),
            algorithm,
            records: BTreeMap::new(),
            folders: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> Option<DigestAlgorithm> {
        self.algorithm
    }

    /// Insert a record, replacing any previous record for the same path.
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(record.relative_path.clone(), record)
    }

    pub fn insert_folder(&mut self, relative_path: impl Into<String>) {
        self.folders.insert(relative_path.into());
    }

    pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
        self.records.get(relative_path)
    }

    pub fn remove(&mut self, relative_path: &str) -> Option<FileRecord> {
        self.records.remove(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.records.contains_key(relative_path)
    }

    /// Records in path order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Records whose path lies below `folder`, in path order.
    pub fn records_under<'a>(&'a self, folder: &str) -> impl Iterator<Item = &'a FileRecord> + 'a {
        let prefix = format!("{}/", folder);
        self.records
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
            .map(|(_, record)| record)
    }

    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.folders.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }
}
