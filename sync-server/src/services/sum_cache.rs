//! Cached file digests.
//!
//! A cached digest is served only while the file's size and mtime are
//! unchanged, the entry is younger than the TTL, and it was computed under the
//! current registry generation.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use sync_agent::digest::{Digest, DigestAlgorithm};
use sync_agent::fs::FileStamp;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SumKey {
    pub resource: String,
    pub path: String,
    pub algorithm: DigestAlgorithm,
}

#[derive(Debug, Clone)]
struct CachedSum {
    stamp: FileStamp,
    digest: Digest,
    generation: u64,
    inserted: Instant,
}

pub struct SumCache {
    entries: DashMap<SumKey, CachedSum>,
    ttl: Duration,
}

impl SumCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &SumKey, stamp: &FileStamp, generation: u64) -> Option<Digest> {
        let fresh = {
            let entry = self.entries.get(key)?;
            let valid = entry.stamp == *stamp
                && entry.generation == generation
                && entry.inserted.elapsed() < self.ttl;
            valid.then(|| entry.digest.clone())
        };
        if fresh.is_none() {
            self.entries.remove(key);
        }
        fresh
    }

    pub fn insert(&self, key: SumKey, stamp: FileStamp, digest: Digest, generation: u64) {
        self.entries.insert(
            key,
            CachedSum {
                stamp,
                digest,
                generation,
                inserted: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SumKey {
        SumKey {
            resource: "photos".into(),
            path: "a.jpg".into(),
            algorithm: DigestAlgorithm::Sha256,
        }
    }

    fn stamp(size: u64) -> FileStamp {
        FileStamp { size, mtime_ns: 1_000 }
    }

    #[test]
    fn test_hit_requires_same_stamp_and_generation() {
        let cache = SumCache::new(Duration::from_secs(60));
        let digest = DigestAlgorithm::Sha256.digest_bytes(b"x");
        cache.insert(key(), stamp(1), digest.clone(), 1);

        assert_eq!(cache.get(&key(), &stamp(1), 1), Some(digest.clone()));
        assert_eq!(cache.get(&key(), &stamp(1), 2), None);
        // the stale entry was dropped
        assert_eq!(cache.len(), 0);

        cache.insert(key(), stamp(1), digest, 1);
        assert_eq!(cache.get(&key(), &stamp(2), 1), None);
    }

    #[test]
    fn test_expired_entries_are_ignored() {
        let cache = SumCache::new(Duration::ZERO);
        cache.insert(key(), stamp(1), Digest::empty(), 1);
        assert_eq!(cache.get(&key(), &stamp(1), 1), None);
    }
}
