//! Countermeasure nonce generation: an 8-bit xorshift PRNG behind an
//! entropy seam.
//!
//! The firmware seeds its PRNG from the bottom bit of a free-running ADC
//! channel. On the host that seam is the [`EntropySource`] trait; the PRNG
//! itself is kept bit-compatible so recorded traces line up with the card.
//! The generator is adequate for countermeasure nonces, not for keys.

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

/// Errors raised by entropy sources.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyError {
    /// The entropy source could not be read.
    ///
    /// Decryption must be aborted; a zero seed would fix every mask.
    #[error("entropy source unavailable")]
    Unavailable,
}

/// One bit of seed noise per read, standing in for the ADC's LSB.
pub trait EntropySource {
    /// Reads the next noise bit.
    fn read_lsb(&mut self) -> Result<bool, EntropyError>;
}

impl<E: EntropySource + ?Sized> EntropySource for Box<E> {
    fn read_lsb(&mut self) -> Result<bool, EntropyError> {
        (**self).read_lsb()
    }
}

/// Entropy from operating-system randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn read_lsb(&mut self) -> Result<bool, EntropyError> {
        Ok(OsRng.next_u32() & 1 == 1)
    }
}

/// Deterministic entropy for tests and reproducible runs.
#[derive(Debug, Clone)]
pub struct SeededEntropy {
    rng: ChaCha20Rng,
}

impl SeededEntropy {
    /// Creates a source from a 64-bit seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[..8].copy_from_slice(&seed.to_le_bytes());
        Self {
            rng: ChaCha20Rng::from_seed(seed_bytes),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn read_lsb(&mut self) -> Result<bool, EntropyError> {
        Ok(self.rng.next_u32() & 1 == 1)
    }
}

/// 8-bit xorshift generator with taps 7 (left), 5 (right), 3 (left).
#[derive(Debug, Default, Clone, Copy)]
pub struct Xorshift8 {
    state: u8,
}

impl Xorshift8 {
    /// Reseeds the state from 8 successive entropy bits.
    ///
    /// Bit `i` of the read sequence lands in bit `i` of the state.
    pub fn seed(&mut self, entropy: &mut impl EntropySource) -> Result<(), EntropyError> {
        self.state = 0;
        for i in 0..8 {
            self.state |= (entropy.read_lsb()? as u8) << i;
        }
        Ok(())
    }

    /// Returns the next pseudo-random byte.
    pub fn next_byte(&mut self) -> u8 {
        self.state ^= self.state << 7;
        self.state ^= self.state >> 5;
        self.state ^= self.state << 3;
        self.state
    }
}
