use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named directory tree served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(alias = "rootPath")]
    pub root_path: PathBuf,
}
