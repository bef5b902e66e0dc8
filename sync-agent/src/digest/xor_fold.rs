//! XOR-fold checksum.
//!
//! Each input byte is XORed into a fixed-size accumulator at a rotating
//! cursor that wraps modulo the accumulator length. Cheap and chunking
//! independent, but NOT a security checksum: anyone can construct a colliding
//! input by flipping bytes at matching cursor positions. Use it for identity
//! and duplicate detection, never for integrity verification of untrusted
//! data.

use super::{Digest, DigestEngine};

#[derive(Debug, Clone)]
pub struct XorFold {
    accumulator: Vec<u8>,
    cursor: usize,
}

impl XorFold {
    /// Create a fold with a `width`-byte accumulator (at least 1).
    pub fn new(width: usize) -> Self {
        Self {
            accumulator: vec![0; width.max(1)],
            cursor: 0,
        }
    }
}

impl DigestEngine for XorFold {
    fn reset(&mut self) {
        self.accumulator.iter_mut().for_each(|b| *b = 0);
        self.cursor = 0;
    }

    fn update(&mut self, data: &[u8]) {
        let width = self.accumulator.len();
        for &byte in data {
            self.accumulator[self.cursor] ^= byte;
            self.cursor = (self.cursor + 1) % width;
        }
    }

    fn digest(&self) -> Digest {
        Digest::new(self.accumulator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_all_zero() {
        let fold = XorFold::new(4);
        assert_eq!(fold.digest().as_bytes(), &[0, 0, 0, 0]);
        assert_eq!(XorFold::new(32).digest().as_bytes(), &[0u8; 32][..]);
    }

    #[test]
    fn test_wraps_cursor() {
        let mut fold = XorFold::new(4);
        fold.update(&[5, 15, 25, 35, 45]);
        // byte 0 absorbs positions 0 and 4: 5 ^ 45 = 40
        assert_eq!(fold.digest().as_bytes(), &[40, 15, 25, 35]);
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut whole = XorFold::new(32);
        whole.update(&data);

        for chunk_size in [1, 3, 7, 31, 32, 33, 999] {
            let mut pieces = XorFold::new(32);
            for chunk in data.chunks(chunk_size) {
                pieces.update(chunk);
            }
            assert_eq!(pieces.digest(), whole.digest(), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_reset() {
        let mut fold = XorFold::new(4);
        fold.update(&[1, 2, 3]);
        fold.reset();
        fold.update(&[5, 15, 25, 35, 45]);
        assert_eq!(fold.digest().as_bytes(), &[40, 15, 25, 35]);
    }

    #[test]
    fn test_digest_does_not_consume_state() {
        let mut fold = XorFold::new(4);
        fold.update(&[5, 15]);
        let _ = fold.digest();
        fold.update(&[25, 35, 45]);
        assert_eq!(fold.digest().as_bytes(), &[40, 15, 25, 35]);
    }
}
