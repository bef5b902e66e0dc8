//! Size and modification-time stamps used for change detection.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// What a file looked like on disk at some point: enough to tell whether a
/// previously computed digest can still be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (nanoseconds since Unix epoch)
    pub mtime_ns: i64,
}

impl FileStamp {
    /// Stamp a regular file without following symlinks.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Self::from_metadata(&fs::symlink_metadata(path)?)
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> std::io::Result<Self> {
        let mtime_ns = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0);

        Ok(Self {
            size: metadata.len(),
            mtime_ns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_stamp_file() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let stamp = FileStamp::from_path(temp_file.path())?;
        assert_eq!(stamp.size, 12);
        assert!(stamp.mtime_ns > 0);
        assert_eq!(stamp, FileStamp::from_path(temp_file.path())?);

        Ok(())
    }
}
