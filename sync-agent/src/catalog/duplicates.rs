//! Duplicate detection over a hashed catalog.

use super::Catalog;
use crate::digest::{Digest, DigestEngine, Sha256Engine};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Files sharing size and digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub size: u64,
    pub digest: Digest,
    pub paths: Vec<String>,
}

impl DuplicateGroup {
    /// Bytes that would be freed by keeping a single copy.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.paths.len() as u64).saturating_sub(1)
    }
}

/// Folders whose whole content (relative paths and digests) is identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateFolderGroup {
    pub fingerprint: Digest,
    pub file_count: usize,
    pub total_bytes: u64,
    pub folders: Vec<String>,
}

/// Group the checked, non-empty files of `catalog` by `(size, digest)`.
/// Groups are ordered by wasted bytes, largest first.
pub fn find_duplicate_files(catalog: &Catalog) -> Vec<DuplicateGroup> {
    let mut by_content: BTreeMap<(u64, &Digest), Vec<String>> = BTreeMap::new();

    for record in catalog.records() {
        if !record.checked || record.size == 0 {
            continue;
        }
        by_content
            .entry((record.size, &record.digest))
            .or_default()
            .push(record.relative_path.clone());
    }

    let mut groups: Vec<DuplicateGroup> = by_content
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|((size, digest), paths)| DuplicateGroup {
            size,
            digest: digest.clone(),
            paths,
        })
        .collect();

    groups.sort_by(|a, b| b.wasted_bytes().cmp(&a.wasted_bytes()));
    groups
}

/// Group folders with identical content. Needs a catalog scanned with
/// folders and digests. A group is dropped when every member sits inside a
/// folder that is itself reported as duplicate.
pub fn find_duplicate_folders(catalog: &Catalog) -> Vec<DuplicateFolderGroup> {
    let mut by_fingerprint: BTreeMap<Digest, (usize, u64, Vec<String>)> = BTreeMap::new();

    for folder in catalog.folders() {
        let prefix_len = folder.len() + 1;
        let mut engine = Sha256Engine::new();
        let mut file_count = 0usize;
        let mut total_bytes = 0u64;

        for record in catalog.records_under(folder) {
            if !record.checked {
                continue;
            }
            engine.update(record.relative_path[prefix_len..].as_bytes());
            engine.update(&[0]);
            engine.update(&record.size.to_le_bytes());
            engine.update(record.digest.as_bytes());
            file_count += 1;
            total_bytes += record.size;
        }

        if file_count == 0 {
            continue;
        }

        let entry = by_fingerprint
            .entry(engine.digest())
            .or_insert_with(|| (file_count, total_bytes, Vec::new()));
        entry.2.push(folder.to_string());
    }

    let groups: Vec<DuplicateFolderGroup> = by_fingerprint
        .into_iter()
        .filter(|(_, (_, _, folders))| folders.len() > 1)
        .map(|(fingerprint, (file_count, total_bytes, folders))| DuplicateFolderGroup {
            fingerprint,
            file_count,
            total_bytes,
            folders,
        })
        .collect();

    let reported: HashSet<&str> = groups
        .iter()
        .flat_map(|g| g.folders.iter().map(String::as_str))
        .collect();

    let mut kept: Vec<DuplicateFolderGroup> = groups
        .iter()
        .filter(|g| {
            !g.folders.iter().all(|f| match f.rsplit_once('/') {
                Some((parent, _)) => reported.contains(parent),
                None => false,
            })
        })
        .cloned()
        .collect();

    kept.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::digest::DigestAlgorithm;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_duplicate_files() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("copy"))?;
        fs::write(temp_dir.path().join("photo.jpg"), b"jpeg bytes")?;
        fs::write(temp_dir.path().join("copy/photo.jpg"), b"jpeg bytes")?;
        fs::write(temp_dir.path().join("other.jpg"), b"different!")?;
        fs::write(temp_dir.path().join("empty1"), b"")?;
        fs::write(temp_dir.path().join("empty2"), b"")?;

        let catalog = CatalogBuilder::new(temp_dir.path())
            .hashed(DigestAlgorithm::Xor { width: 32 })
            .build()
            .unwrap()
            .catalog;

        let groups = find_duplicate_files(&catalog);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].paths, vec!["copy/photo.jpg", "photo.jpg"]);
        assert_eq!(groups[0].wasted_bytes(), 10);
        Ok(())
    }

    #[test]
    fn test_duplicate_folders_collapse_nested_matches() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for top in ["album", "backup"] {
            fs::create_dir_all(temp_dir.path().join(top).join("raw"))?;
            fs::write(temp_dir.path().join(top).join("cover.png"), b"png")?;
            fs::write(temp_dir.path().join(top).join("raw/1.cr2"), b"raw one")?;
        }
        fs::create_dir(temp_dir.path().join("unrelated"))?;
        fs::write(temp_dir.path().join("unrelated/cover.png"), b"png")?;

        let catalog = CatalogBuilder::new(temp_dir.path())
            .hashed(DigestAlgorithm::Sha256)
            .with_folders()
            .build()
            .unwrap()
            .catalog;

        let groups = find_duplicate_folders(&catalog);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].folders, vec!["album", "backup"]);
        assert_eq!(groups[0].file_count, 2);
        assert_eq!(groups[0].total_bytes, 10);
        Ok(())
    }
}
