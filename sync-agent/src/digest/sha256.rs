//! SHA-256 engine for integrity verification.

use super::{Digest, DigestEngine};
use sha2::{Digest as _, Sha256};

#[derive(Debug, Clone, Default)]
pub struct Sha256Engine {
    hasher: Sha256,
}

impl Sha256Engine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DigestEngine for Sha256Engine {
    fn reset(&mut self) {
        self.hasher = Sha256::new();
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn digest(&self) -> Digest {
        Digest::new(self.hasher.clone().finalize().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let mut engine = Sha256Engine::new();
        engine.update(b"abc");
        assert_eq!(
            engine.digest().to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut whole = Sha256Engine::new();
        whole.update(data);

        let mut pieces = Sha256Engine::new();
        for chunk in data.chunks(5) {
            pieces.update(chunk);
        }

        assert_eq!(whole.digest(), pieces.digest());
    }

    #[test]
    fn test_reset_matches_fresh_engine() {
        let mut engine = Sha256Engine::new();
        engine.update(b"garbage");
        engine.reset();
        assert_eq!(engine.digest(), Sha256Engine::new().digest());
    }
}
