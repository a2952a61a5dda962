//! Boolean masking of the decryption data path.
//!
//! The scheme follows Mangard, Oswald & Popp, "Power Analysis Attacks"
//! (pp. 228 ff.), adjusted for decryption: one SubByte mask pair `(m, m′)`
//! drives a masked inverse S-Box, and four MixCol pairs `(m_i, m_i′)` — one
//! per state row — ride through the diffusion layer. All masks and the
//! masked table are rebuilt from fresh PRNG output on every decryption.

use crate::key::SubKeys;
use crate::lut::{INV_MIX_COL_MATRIX, INV_S_BOX};
use crate::math::ff_mul;
use crate::rng::{EntropyError, EntropySource, Xorshift8};
use crate::state::State;

/// An input/output mask pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaskPair {
    /// Mask on the operation's input side.
    pub input: u8,
    /// Mask on the operation's output side.
    pub output: u8,
}

/// Per-decryption masking context.
#[derive(Clone)]
pub struct Masking {
    /// Inverse S-Box with masked values: `table[x ⊕ m′] = S⁻¹[x] ⊕ m`.
    inv_masked_sbox: [u8; 256],
    /// SubByte pair; `input` is `m`, `output` is `m′`.
    sub_byte_mask: MaskPair,
    /// MixCol pairs; `input` is `m_i`, `output` is `m_i′`, row `i − 1`.
    mix_col_masks: [MaskPair; 4],
    rng: Xorshift8,
}

impl Default for Masking {
    fn default() -> Self {
        Self {
            inv_masked_sbox: [0u8; 256],
            sub_byte_mask: MaskPair::default(),
            mix_col_masks: [MaskPair::default(); 4],
            rng: Xorshift8::default(),
        }
    }
}

impl Masking {
    /// Draws fresh masks and rebuilds the masked inverse S-Box.
    ///
    /// With `weaken_for_dpa` set, `m′ = m` and every MixCol output mask
    /// collapses to `m`, making recorded traces reproducible for
    /// evaluation runs.
    pub fn init(
        &mut self,
        entropy: &mut impl EntropySource,
        weaken_for_dpa: bool,
    ) -> Result<(), EntropyError> {
        self.rng.seed(entropy)?;
        self.sub_byte_mask.input = self.rng.next_byte();

        if weaken_for_dpa {
            self.sub_byte_mask.output = self.sub_byte_mask.input;
            for pair in self.mix_col_masks.iter_mut() {
                pair.output = self.sub_byte_mask.input;
                pair.input = 0;
            }
        } else {
            self.sub_byte_mask.output = self.rng.next_byte();
            for pair in self.mix_col_masks.iter_mut() {
                pair.output = self.rng.next_byte();
                pair.input = 0;
            }
        }

        self.init_inv_masked_sbox();
        self.init_mix_col_input_masks();
        Ok(())
    }

    /// Masks the sub-key table: `masked[i][j] = plain[i][j] ⊕ m_{(j mod 4)+1}′ ⊕ m`.
    ///
    /// Byte `j` of a flat round key belongs to state row `j mod 4`, so it
    /// picks up the MixCol output mask of its row.
    pub fn mask_sub_keys(&self, sub_keys: &SubKeys, masked_sub_keys: &mut SubKeys) {
        for i in 0..11 {
            for j in 0..16 {
                masked_sub_keys.0[i][j] = sub_keys.0[i][j]
                    ^ self.mix_col_masks[j % 4].output
                    ^ self.sub_byte_mask.input;
            }
        }
    }

    /// Masks the state before the first `AddRoundKey`.
    ///
    /// The keys carry `m_i′ ⊕ m`, so XORing `m_i′ ⊕ m ⊕ m′` here leaves the
    /// state masked with exactly `m′` after that key addition — the input
    /// the masked S-Box expects.
    pub fn inv_mask_state(&self, state: &mut State) {
        for col in 0..4 {
            for row in 0..4 {
                state.0[row][col] ^= self.mix_col_masks[row].output
                    ^ self.sub_byte_mask.input
                    ^ self.sub_byte_mask.output;
            }
        }
    }

    /// Restores the S-Box input mask after an `InvMixCols`.
    ///
    /// The diffusion step turns row masks into `m_i`; XORing `m_i ⊕ m′`
    /// clears them and re-arms `m′` for the next round.
    pub fn inv_re_mask_state(&self, state: &mut State) {
        for col in 0..4 {
            for row in 0..4 {
                state.0[row][col] ^=
                    self.mix_col_masks[row].input ^ self.sub_byte_mask.output;
            }
        }
    }

    /// Removes the final `m_i′` row masks after the last `AddRoundKey`.
    pub fn inv_un_mask_state(&self, state: &mut State) {
        for col in 0..4 {
            for row in 0..4 {
                state.0[row][col] ^= self.mix_col_masks[row].output;
            }
        }
    }

    /// Looks up the masked inverse S-Box.
    #[inline]
    pub fn inv_masked_sbox_value(&self, index: u8) -> u8 {
        self.inv_masked_sbox[index as usize]
    }

    /// Rebuilds the table so that `table[x ⊕ m′] = S⁻¹[x] ⊕ m`.
    fn init_inv_masked_sbox(&mut self) {
        for i in 0..256usize {
            self.inv_masked_sbox[i ^ self.sub_byte_mask.output as usize] =
                INV_S_BOX[i] ^ self.sub_byte_mask.input;
        }
    }

    /// Derives the input masks by pushing the output-mask vector through
    /// the inverse MixColumns matrix.
    fn init_mix_col_input_masks(&mut self) {
        for row in 0..4 {
            for element in 0..4 {
                self.mix_col_masks[row].input ^= ff_mul(
                    INV_MIX_COL_MATRIX[row][element],
                    self.mix_col_masks[element].output,
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn sub_byte_mask(&self) -> MaskPair {
        self.sub_byte_mask
    }

    #[cfg(test)]
    pub(crate) fn mix_col_masks(&self) -> [MaskPair; 4] {
        self.mix_col_masks
    }
}
