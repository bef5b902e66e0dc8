//! Client-side synchronization: diff a local catalog against a remote
//! resource and pull whatever is missing or different.

pub mod driver;
pub mod fetch;
pub mod plan;
pub mod report;
pub mod retry;

pub use driver::{SyncDriver, SyncOptions};
pub use plan::{build_plan, FetchReason, PlanEntry, SyncAction, SyncPlan};
pub use report::{FailureKind, FileFailure, RunState, SyncReport};
pub use retry::RetryPolicy;
