//! Progress tracking shared by scans and transfers.

pub mod progress;

pub use progress::{ProgressCallback, ProgressEvent, ProgressReporter, ScanProgress, TransferProgress};
