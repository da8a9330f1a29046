//! Seeded randomness: one deterministic stream per tag.
//!
//! The factory owns the seed bytes (caller-supplied, or 16 crypto-random
//! bytes). Each tag yields an independent stream seeded from
//! `MD5(tag ‖ seed)`, so every decision point in generation draws from its
//! own reproducible sequence and the overall result is a pure function of
//! the seed. The tag strings are part of the determinism ABI.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A generation seed: UTF-8 text or raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seed {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for Seed {
    fn from(s: &str) -> Self {
        Seed::Text(s.to_string())
    }
}

impl From<String> for Seed {
    fn from(s: String) -> Self {
        Seed::Text(s)
    }
}

impl From<Vec<u8>> for Seed {
    fn from(b: Vec<u8>) -> Self {
        Seed::Bytes(b)
    }
}

/// Factory for per-tag deterministic random streams.
pub struct RngFactory {
    seed: Vec<u8>,
}

impl RngFactory {
    /// Build a factory from an optional seed; absent seeds draw 16
    /// cryptographically random bytes.
    pub fn new(seed: Option<Seed>) -> RngFactory {
        let seed = match seed {
            Some(Seed::Text(s)) => s.into_bytes(),
            Some(Seed::Bytes(b)) => b,
            None => {
                let mut bytes = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                bytes.to_vec()
            }
        };
        RngFactory { seed }
    }

    pub fn from_seed(seed: &[u8]) -> RngFactory {
        RngFactory {
            seed: seed.to_vec(),
        }
    }

    pub fn seed(&self) -> &[u8] {
        &self.seed
    }

    /// The stream for a tag, seeded from `MD5(tag ‖ seed)`.
    pub fn stream(&self, tag: &str) -> TagRng {
        let mut data = Vec::with_capacity(tag.len() + self.seed.len());
        data.extend_from_slice(tag.as_bytes());
        data.extend_from_slice(&self.seed);
        let digest = md5::compute(&data);
        let mut seed32 = [0u8; 32];
        seed32[..16].copy_from_slice(&digest.0);
        seed32[16..].copy_from_slice(&digest.0);
        TagRng(ChaCha8Rng::from_seed(seed32))
    }

    /// First `random()` draw of a tag's stream; the common single-use case.
    pub fn sample(&self, tag: &str) -> f64 {
        self.stream(tag).random()
    }
}

/// One tag's random stream.
pub struct TagRng(ChaCha8Rng);

impl TagRng {
    /// Uniform in `[0, 1)` with 53 bits of precision.
    pub fn random(&mut self) -> f64 {
        (self.0.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}
