//! Key types and the AES-128 key schedule.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::lut::S_BOX;

/// Round coefficients applied to the first byte of each `g` word.
const ROUND_COEFFICIENTS: [u8; 10] = [
    0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36,
];

/// AES-128 master key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Aes128Key(pub [u8; 16]);

impl From<[u8; 16]> for Aes128Key {
    fn from(value: [u8; 16]) -> Self {
        Self(value)
    }
}

/// The 11 expanded round keys, index 0 = master key. Wiped on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SubKeys(pub [[u8; 16]; 11]);

impl SubKeys {
    /// Returns the round key at `round` (0..=10).
    #[inline]
    pub fn get(&self, round: usize) -> &[u8; 16] {
        &self.0[round]
    }
}

/// Expands a master key into the 11-entry sub-key table.
///
/// Byte-oriented form of the AES-128 schedule: the `g` word starts at byte
/// 13 of the previous key, which folds the one-byte word rotation and the
/// S-Box substitution into a single step.
pub fn key_schedule(master_key: &Aes128Key) -> SubKeys {
    let mut sub_keys = SubKeys::default();
    sub_keys.0[0] = master_key.0;

    for key_index in 1..=10 {
        let prev = sub_keys.0[key_index - 1];
        let g = [
            S_BOX[prev[13] as usize] ^ ROUND_COEFFICIENTS[key_index - 1],
            S_BOX[prev[14] as usize],
            S_BOX[prev[15] as usize],
            S_BOX[prev[12] as usize],
        ];
        for i in 0..4 {
            sub_keys.0[key_index][i] = prev[i] ^ g[i];
        }
        for i in 4..16 {
            sub_keys.0[key_index][i] = prev[i] ^ sub_keys.0[key_index][i - 4];
        }
    }

    sub_keys
}
