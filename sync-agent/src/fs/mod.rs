//! Filesystem traversal and metadata.

pub mod metadata;
pub mod walker;

pub use metadata::FileStamp;
pub use walker::{PathEntry, WalkIssue, WalkOptions, Walker};
