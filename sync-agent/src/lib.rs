//! Sync Agent Library
//!
//! Content-addressed backup sync: scan a tree into a digest catalog, diff it
//! against a remote resource, and pull the files that are missing or differ.

pub mod api;
pub mod catalog;
pub mod config;
pub mod daemon;
pub mod digest;
pub mod fs;
pub mod protocol;
pub mod remote;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{Result, SyncError};
