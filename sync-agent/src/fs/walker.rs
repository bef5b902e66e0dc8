//! Breadth-first directory traversal.
//!
//! The walker keeps a FIFO of pending folders and buffers exactly one
//! folder's listing at a time, so deep trees neither grow the call stack nor
//! load the whole tree into memory. Symlinks are never followed and never
//! yielded. Subtrees that cannot be read because of permissions are skipped
//! and reported through [`Walker::issues`].

use crate::utils::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file or folder discovered during the walk, relative to the root.
/// Separators are always `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub relative_path: String,
    pub is_directory: bool,
}

/// A recoverable problem met during the walk (an unreadable subtree or file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkIssue {
    pub relative_path: String,
    pub message: String,
}

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Exact file or folder names to leave out (e.g. ".DS_Store").
    pub exclude_names: Vec<String>,
}

/// Lazy, forward-only BFS over a directory tree.
pub struct Walker {
    root: PathBuf,
    options: WalkOptions,
    pending: VecDeque<String>,
    listing: VecDeque<PathEntry>,
    issues: Vec<WalkIssue>,
    folders_listed: usize,
    cancel: Option<CancellationToken>,
    done: bool,
}

impl Walker {
    /// Create a walker rooted at `root`.
    ///
    /// Fails with `NotFound` if the root does not exist and `NotADirectory`
    /// if it is something else than a directory.
    pub fn new(root: &Path, options: WalkOptions) -> Result<Self> {
        let display = root.display().to_string();
        let metadata = std::fs::metadata(root).map_err(|e| SyncError::from_io(e, &display))?;
        if !metadata.is_dir() {
            return Err(SyncError::NotADirectory(display));
        }

        let mut pending = VecDeque::new();
        pending.push_back(String::new());

        Ok(Self {
            root: root.to_path_buf(),
            options,
            pending,
            listing: VecDeque::new(),
            issues: Vec::new(),
            folders_listed: 0,
            cancel: None,
            done: false,
        })
    }

    /// Check `token` every time the walk moves on to the next folder.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subtrees and entries skipped so far.
    pub fn issues(&self) -> &[WalkIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<WalkIssue> {
        self.issues
    }

    /// Number of folders whose listing has been loaded. When this changes
    /// between two entries, the previous folder has been fully drained.
    pub fn folders_listed(&self) -> usize {
        self.folders_listed
    }

    /// Read one folder's entries into the listing buffer, queueing
    /// subfolders for later.
    fn list_folder(&mut self, folder: &str) -> Result<()> {
        let dir = if folder.is_empty() {
            self.root.clone()
        } else {
            self.root.join(folder)
        };

        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let denied = err
                        .io_error()
                        .map(|e| e.kind() == io::ErrorKind::PermissionDenied)
                        .unwrap_or(false);
                    let relative = err
                        .path()
                        .map(|p| self.relative(p))
                        .unwrap_or_else(|| folder.to_string());

                    if denied {
                        warn!(path = %relative, "Access denied, skipping");
                        self.issues.push(WalkIssue {
                            relative_path: relative,
                            message: "access denied".to_string(),
                        });
                        continue;
                    }
                    return Err(SyncError::Io(io::Error::from(err)));
                }
            };

            let relative_path = self.relative(entry.path());
            let Some(name) = entry.file_name().to_str() else {
                warn!(path = %relative_path, "File name is not valid UTF-8, skipping");
                self.issues.push(WalkIssue {
                    relative_path,
                    message: "unsupported file name (not UTF-8)".to_string(),
                });
                continue;
            };
            if self.options.exclude_names.iter().any(|n| n == name) {
                continue;
            }

            let file_type = entry.file_type();

            if file_type.is_symlink() {
                debug!(path = %relative_path, "Skipping symlink");
                continue;
            }

            if file_type.is_dir() {
                self.pending.push_back(relative_path.clone());
                self.listing.push_back(PathEntry {
                    relative_path,
                    is_directory: true,
                });
            } else if file_type.is_file() {
                self.listing.push_back(PathEntry {
                    relative_path,
                    is_directory: false,
                });
            } else {
                return Err(SyncError::InconsistentFilesystemState(format!(
                    "unsupported node type at {}",
                    relative_path
                )));
            }
        }

        Ok(())
    }

    fn relative(&self, path: &Path) -> String {
        relative_path_string(&self.root, path)
    }
}

impl Iterator for Walker {
    type Item = Result<PathEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.listing.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }

            let Some(folder) = self.pending.pop_front() else {
                self.done = true;
                return None;
            };

            if self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false) {
                self.done = true;
                return Some(Err(SyncError::Cancelled));
            }

            if let Err(e) = self.list_folder(&folder) {
                self.done = true;
                self.listing.clear();
                return Some(Err(e));
            }
            self.folders_listed += 1;
        }
    }
}

/// `path` relative to `root`, joined with `/`.
pub fn relative_path_string(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk the whole tree and collect the entries plus any issues.
pub fn walk_directory(root: &Path, options: WalkOptions) -> Result<(Vec<PathEntry>, Vec<WalkIssue>)> {
    let mut walker = Walker::new(root, options)?;
    let mut entries = Vec::new();
    for entry in walker.by_ref() {
        entries.push(entry?);
    }
    Ok((entries, walker.into_issues()))
}
