//! Wire types of the catalog protocol.
//!
//! Three endpoints, all taking their parameters from the query string and
//! all requiring a `token`:
//!
//! | Endpoint      | Parameters                                  | Response            |
//! |---------------|---------------------------------------------|---------------------|
//! | `/file-list`  | `resource`                                  | [`ListResponse`]    |
//! | `/file-sum`   | `resource`, `path`, optional `algorithm`    | [`SumResponse`]     |
//! | `/file-data`  | `resource`, `path`, `offset`, opt. `length` | raw bytes           |

use crate::digest::{Digest, DigestAlgorithm};
use serde::{Deserialize, Serialize};

pub const FILE_LIST_PATH: &str = "/file-list";
pub const FILE_SUM_PATH: &str = "/file-sum";
pub const FILE_DATA_PATH: &str = "/file-data";

/// Response header carrying the full size of the file behind a data range.
pub const TOTAL_SIZE_HEADER: &str = "x-total-size";

pub const PARAM_TOKEN: &str = "token";
pub const PARAM_RESOURCE: &str = "resource";
pub const PARAM_PATH: &str = "path";
pub const PARAM_OFFSET: &str = "offset";
pub const PARAM_LENGTH: &str = "length";
pub const PARAM_ALGORITHM: &str = "algorithm";

/// One file of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub resource: String,
    /// Default digest algorithm of the server.
    pub algorithm: DigestAlgorithm,
    pub files: Vec<ListEntry>,
    /// Subtrees the server could not read while listing.
    #[serde(default)]
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumResponse {
    pub path: String,
    pub size: u64,
    pub algorithm: DigestAlgorithm,
    pub digest: Digest,
}

/// Error body returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Whether a client-supplied relative path stays inside the resource root:
/// no absolute paths, no `..`, no empty or `.` components.
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.contains('\0')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}
