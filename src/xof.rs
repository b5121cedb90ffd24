//! Deterministic byte sources for protocol randomness.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Length of a stream-PRG key in bytes.
pub const STREAM_KEY_BYTES: usize = 16;

/// A seekless, deterministic byte stream.
///
/// All randomness consumed by the field, DPF and query layers flows through
/// one of these; the same key and draw sequence always reproduces the same
/// bytes.
pub enum Xof {
    Keyed(blake3::OutputReader),
    Stream(ChaCha20Rng),
}

impl Xof {
    /// Keyed extendable-output source: a BLAKE3 XOF over the key material.
    pub fn keyed(key: &[u8]) -> Xof {
        let mut hasher = blake3::Hasher::new();
        hasher.update(key);
        Xof::Keyed(hasher.finalize_xof())
    }

    /// Stream PRG keyed by 16 bytes (ChaCha20 with a zero-padded seed).
    pub fn stream(key: &[u8; STREAM_KEY_BYTES]) -> Xof {
        let mut seed = [0u8; 32];
        seed[..STREAM_KEY_BYTES].copy_from_slice(key);
        Xof::Stream(ChaCha20Rng::from_seed(seed))
    }

    /// Fill `buf` with the next bytes of the stream.
    pub fn read(&mut self, buf: &mut [u8]) {
        match self {
            Xof::Keyed(reader) => reader.fill(buf),
            Xof::Stream(rng) => rng.fill_bytes(buf),
        }
    }
}
