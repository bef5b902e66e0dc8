//! Pluggable running checksums.
//!
//! Every algorithm implements [`DigestEngine`] (`reset` / `update` / `digest`)
//! and must give the same result no matter how the input is chunked, so file
//! reads with varying buffer sizes still produce reproducible catalogs.
//!
//! Algorithms are named values ([`DigestAlgorithm`]) picked from
//! configuration. The default for backup integrity is SHA-256; the XOR fold
//! stays available for duplicate detection.

mod sha256;
mod xor_fold;

pub use sha256::Sha256Engine;
pub use xor_fold::XorFold;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Default accumulator width of the XOR fold, in bytes.
pub const DEFAULT_XOR_WIDTH: usize = 32;

/// Widest XOR accumulator accepted by name, in bytes.
pub const MAX_XOR_WIDTH: usize = 1024;

/// Default read buffer when hashing files (1MB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Running checksum over a byte stream.
pub trait DigestEngine: Send {
    /// Drop all absorbed input.
    fn reset(&mut self);

    /// Absorb the next piece of the stream.
    fn update(&mut self, data: &[u8]);

    /// Digest of everything absorbed since the last reset. Does not consume
    /// the state; more input may follow.
    fn digest(&self) -> Digest;
}

/// Fixed-size digest bytes. Rendered as lowercase hex on the wire.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Digest of a structural listing entry that was never hashed.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(Self)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Named digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// XOR fold with an accumulator of `width` bytes. Identity and duplicate
    /// detection only: trivially forgeable.
    Xor { width: usize },
    Sha256,
}

impl DigestAlgorithm {
    /// Build a fresh engine for this algorithm.
    pub fn engine(&self) -> Box<dyn DigestEngine> {
        match *self {
            DigestAlgorithm::Xor { width } => Box::new(XorFold::new(width)),
            DigestAlgorithm::Sha256 => Box::new(Sha256Engine::new()),
        }
    }

    /// Length in bytes of the digests this algorithm produces.
    pub fn output_len(&self) -> usize {
        match *self {
            DigestAlgorithm::Xor { width } => width,
            DigestAlgorithm::Sha256 => 32,
        }
    }

    /// Whether the algorithm resists deliberate collisions.
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, DigestAlgorithm::Sha256)
    }

    /// Digest a whole byte slice.
    pub fn digest_bytes(&self, data: &[u8]) -> Digest {
        let mut engine = self.engine();
        engine.update(data);
        engine.digest()
    }
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        DigestAlgorithm::Sha256
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Xor { width } => write!(f, "xor{}", width),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "sha256" || name == "sha-256" {
            return Ok(DigestAlgorithm::Sha256);
        }
        if name == "xor" {
            return Ok(DigestAlgorithm::Xor { width: DEFAULT_XOR_WIDTH });
        }
        if let Some(width) = name.strip_prefix("xor") {
            return match width.parse::<usize>() {
                Ok(width) if (1..=MAX_XOR_WIDTH).contains(&width) => {
                    Ok(DigestAlgorithm::Xor { width })
                }
                _ => Err(format!(
                    "invalid xor digest width in '{}' (1 to {} bytes)",
                    s, MAX_XOR_WIDTH
                )),
            };
        }
        Err(format!("unknown digest algorithm '{}'", s))
    }
}

impl Serialize for DigestAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DigestAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Digest a file by streaming it through `algorithm` in chunks of
/// `chunk_size` bytes. Returns the digest and the number of bytes read.
pub fn digest_file(
    path: &Path,
    algorithm: DigestAlgorithm,
    chunk_size: usize,
) -> std::io::Result<(Digest, u64)> {
    let mut file = File::open(path)?;
    let mut engine = algorithm.engine();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        engine.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((engine.digest(), total))
}
