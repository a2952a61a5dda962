//! The hardened AES-128 decryptor.

use crate::hiding::Hiding;
use crate::key::{key_schedule, Aes128Key, SubKeys};
use crate::lut::{INV_MIX_COL_MATRIX, INV_S_BOX};
use crate::masking::Masking;
use crate::math::{ff_mul, right_rotate};
use crate::rng::{EntropyError, EntropySource};
use crate::state::State;

/// Runtime selection of the DPA countermeasures.
///
/// The firmware toggled these at compile time; selecting them at runtime
/// lets one binary exercise every combination, which the equivalence tests
/// rely on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Countermeasures {
    /// Boolean masking of the state, keys and S-Box.
    pub masking: bool,
    /// Randomized S-Box access order.
    pub shuffling: bool,
    /// Randomized dummy-cycle padding with a fixed total.
    pub dummy_ops: bool,
    /// Evaluation mode: fix the masks to one value and keep dummy ops away
    /// from everything but the S-Box accesses so traces stay alignable.
    pub dpa: bool,
}

impl Countermeasures {
    /// Everything off; the plain reference decryption.
    pub const fn none() -> Self {
        Self {
            masking: false,
            shuffling: false,
            dummy_ops: false,
            dpa: false,
        }
    }

    /// Full protection: masking, shuffling and dummy ops.
    pub const fn full() -> Self {
        Self {
            masking: true,
            shuffling: true,
            dummy_ops: true,
            dpa: false,
        }
    }

    /// True when either hiding technique is active.
    #[inline]
    fn hiding_enabled(&self) -> bool {
        self.shuffling || self.dummy_ops
    }
}

/// Single-block AES-128 decryptor with masking and hiding woven through
/// the inverse round layers.
///
/// Masks, the masked S-Box, the shuffle order and the dummy-op schedule
/// are all rebuilt from freshly seeded PRNG state on every [`decrypt`]
/// call; nothing randomized survives from one decryption to the next.
///
/// [`decrypt`]: Aes128Decryptor::decrypt
pub struct Aes128Decryptor<E: EntropySource> {
    /// Working key table used by the round loop; holds the masked copy
    /// while masking is active.
    sub_keys: SubKeys,
    /// Plain expanded schedule, kept as the masking source.
    original_sub_keys: SubKeys,
    masking: Masking,
    hiding: Hiding,
    shuffled_sbox_indices: [u8; 16],
    countermeasures: Countermeasures,
    entropy: E,
}

impl<E: EntropySource> Aes128Decryptor<E> {
    /// Expands `master_key` and prepares a decryptor.
    pub fn new(master_key: &Aes128Key, countermeasures: Countermeasures, entropy: E) -> Self {
        let original_sub_keys = key_schedule(master_key);
        Self {
            sub_keys: original_sub_keys.clone(),
            original_sub_keys,
            masking: Masking::default(),
            hiding: Hiding::default(),
            shuffled_sbox_indices: [0u8; 16],
            countermeasures,
            entropy,
        }
    }

    /// Returns the active countermeasure selection.
    pub fn countermeasures(&self) -> Countermeasures {
        self.countermeasures
    }

    /// Decrypts one 16-byte block in place.
    ///
    /// Fails only when the entropy source does, in which case the block is
    /// left unmodified and no weakened decryption happens.
    pub fn decrypt(&mut self, block: &mut [u8; 16]) -> Result<(), EntropyError> {
        let cm = self.countermeasures;

        if cm.masking {
            self.masking.init(&mut self.entropy, cm.dpa)?;
        }
        if cm.hiding_enabled() {
            self.hiding.init(&mut self.entropy, cm.dummy_ops)?;
        }

        let mut state = State::load(block);

        if cm.masking {
            self.masking
                .mask_sub_keys(&self.original_sub_keys, &mut self.sub_keys);
            self.masking.inv_mask_state(&mut state);
        }
        if cm.shuffling {
            self.hiding
                .shuffle_sbox_access(&mut self.shuffled_sbox_indices);
        }

        // Round 10: no InvMixCols on the first decryption round.
        self.add_round_key(10, &mut state);
        self.inv_shift_rows(&mut state);
        self.inv_byte_sub(&mut state);

        for round in (1..=9).rev() {
            self.add_round_key(round, &mut state);
            self.inv_mix_cols(&mut state);
            if cm.masking {
                self.masking.inv_re_mask_state(&mut state);
            }
            self.inv_shift_rows(&mut state);
            self.inv_byte_sub(&mut state);
        }

        self.add_round_key(0, &mut state);
        if cm.masking {
            self.masking.inv_un_mask_state(&mut state);
        }

        state.store(block);
        Ok(())
    }

    /// Dummy-op hook for the non-S-Box layers; quiet in DPA mode so the
    /// analyst can align traces on the S-Box access.
    fn pre_layer_dummy(&mut self) {
        if self.countermeasures.dummy_ops && !self.countermeasures.dpa {
            self.hiding.dummy_op();
        }
    }

    fn add_round_key(&mut self, round: usize, state: &mut State) {
        self.pre_layer_dummy();
        let round_key = self.sub_keys.get(round);
        let mut key_byte = 0;
        for col in 0..4 {
            for row in 0..4 {
                state.0[row][col] ^= round_key[key_byte];
                key_byte += 1;
            }
        }
    }

    fn inv_mix_cols(&mut self, state: &mut State) {
        self.pre_layer_dummy();
        let mut mixed = State::default();
        for col in 0..4 {
            for row in 0..4 {
                for element in 0..4 {
                    mixed.0[row][col] ^=
                        ff_mul(INV_MIX_COL_MATRIX[row][element], state.0[element][col]);
                }
            }
        }
        *state = mixed;
    }

    fn inv_shift_rows(&mut self, state: &mut State) {
        self.pre_layer_dummy();
        for row in 0..4 {
            right_rotate(&mut state.0[row], row);
        }
    }

    fn inv_byte_sub(&mut self, state: &mut State) {
        // The S-Box prefix stays active in DPA mode.
        if self.countermeasures.dummy_ops {
            self.hiding.dummy_op();
        }

        if self.countermeasures.shuffling {
            let order = self.shuffled_sbox_indices;
            for index in order.map(usize::from) {
                // Index k is row k mod 4, column k / 4 of the state.
                let (row, col) = (index % 4, index / 4);
                state.0[row][col] = self.substitute(state.0[row][col]);
            }
        } else {
            for col in 0..4 {
                for row in 0..4 {
                    state.0[row][col] = self.substitute(state.0[row][col]);
                }
            }
        }
    }

    #[inline]
    fn substitute(&self, byte: u8) -> u8 {
        if self.countermeasures.masking {
            self.masking.inv_masked_sbox_value(byte)
        } else {
            INV_S_BOX[byte as usize]
        }
    }

    #[cfg(test)]
    pub(crate) fn hiding(&self) -> &Hiding {
        &self.hiding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededEntropy;
    use hex_literal::hex;

    const NIST_KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    const NIST_CIPHER: [u8; 16] = hex!("3ad77bb40d7a3660a89ecaf32466ef97");
    const NIST_PLAIN: [u8; 16] = hex!("6bc1bee22e409f96e93d7e117393172a");

    fn decryptor(cm: Countermeasures, seed: u64) -> Aes128Decryptor<SeededEntropy> {
        Aes128Decryptor::new(
            &Aes128Key::from(NIST_KEY),
            cm,
            SeededEntropy::from_seed(seed),
        )
    }

    fn all_combinations() -> impl Iterator<Item = Countermeasures> {
        (0..16u8).map(|bits| Countermeasures {
            masking: bits & 1 != 0,
            shuffling: bits & 2 != 0,
            dummy_ops: bits & 4 != 0,
            dpa: bits & 8 != 0,
        })
    }

    #[test]
    fn plain_decryption_matches_nist_vector() {
        let mut aes = decryptor(Countermeasures::none(), 1);
        let mut block = NIST_CIPHER;
        aes.decrypt(&mut block).unwrap();
        assert_eq!(block, NIST_PLAIN);
    }

    #[test]
    fn every_countermeasure_combination_agrees() {
        for (i, cm) in all_combinations().enumerate() {
            let mut aes = decryptor(cm, 100 + i as u64);
            let mut block = NIST_CIPHER;
            aes.decrypt(&mut block).unwrap();
            assert_eq!(block, NIST_PLAIN, "combination {cm:?}");
        }
    }

    #[test]
    fn repeated_calls_stay_correct() {
        // Masks and schedules are rebuilt per call; make sure no state
        // bleeds from one decryption into the next.
        let mut aes = decryptor(Countermeasures::full(), 7);
        for _ in 0..50 {
            let mut block = NIST_CIPHER;
            aes.decrypt(&mut block).unwrap();
            assert_eq!(block, NIST_PLAIN);
        }
    }

    #[test]
    fn dummy_ops_consume_exactly_forty_slots() {
        let cm = Countermeasures {
            dummy_ops: true,
            ..Countermeasures::none()
        };
        let mut aes = decryptor(cm, 8);
        let mut block = NIST_CIPHER;
        aes.decrypt(&mut block).unwrap();
        assert_eq!(aes.hiding().consumed_slots(), 40);
    }

    #[test]
    fn dpa_mode_keeps_only_the_sbox_prefix() {
        let cm = Countermeasures {
            dummy_ops: true,
            dpa: true,
            ..Countermeasures::none()
        };
        let mut aes = decryptor(cm, 9);
        let mut block = NIST_CIPHER;
        aes.decrypt(&mut block).unwrap();
        // 10 InvByteSub invocations per decryption.
        assert_eq!(aes.hiding().consumed_slots(), 10);
    }

    struct BrokenEntropy;

    impl EntropySource for BrokenEntropy {
        fn read_lsb(&mut self) -> Result<bool, EntropyError> {
            Err(EntropyError::Unavailable)
        }
    }

    #[test]
    fn entropy_failure_aborts_before_touching_the_block() {
        let mut aes = Aes128Decryptor::new(
            &Aes128Key::from(NIST_KEY),
            Countermeasures::full(),
            BrokenEntropy,
        );
        let mut block = NIST_CIPHER;
        assert_eq!(aes.decrypt(&mut block), Err(EntropyError::Unavailable));
        assert_eq!(block, NIST_CIPHER);
    }
}
