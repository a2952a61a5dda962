//! Temporal hiding: shuffled S-Box access order and dummy-op padding.
//!
//! Both techniques randomize *when* the interesting power samples occur
//! without changing what is computed. The dummy-op schedule always sums to
//! the same total, so the overall cycle count of a decryption stays fixed
//! while the per-operation alignment jitters.

use crate::rng::{EntropyError, EntropySource, Xorshift8};

/// Fixed total of no-op cycles spent per decryption.
const DUMMY_OPS_TOTAL: u8 = 100;

/// Number of operations that each consume one schedule slot.
const DUMMY_OP_SLOTS: usize = 40;

/// Largest value the 8-bit PRNG can produce.
const MAX_RAND: usize = 255;

/// Per-decryption hiding context.
#[derive(Clone)]
pub struct Hiding {
    /// No-op counts per slot; always sums to [`DUMMY_OPS_TOTAL`].
    schedule: [u8; DUMMY_OP_SLOTS],
    /// Next schedule slot to consume.
    cursor: usize,
    rng: Xorshift8,
}

impl Default for Hiding {
    fn default() -> Self {
        Self {
            schedule: [0u8; DUMMY_OP_SLOTS],
            cursor: 0,
            rng: Xorshift8::default(),
        }
    }
}

impl Hiding {
    /// Reseeds the PRNG and, when `dummy_ops` is set, rebuilds the no-op
    /// schedule and rewinds its cursor.
    ///
    /// The first 39 slots draw `rand mod (remaining / 6)` and the last slot
    /// takes whatever is left, keeping the total at exactly 100. Early
    /// slots would come out larger on average, so the schedule is shuffled
    /// afterwards to remove the positional bias.
    pub fn init(
        &mut self,
        entropy: &mut impl EntropySource,
        dummy_ops: bool,
    ) -> Result<(), EntropyError> {
        self.rng.seed(entropy)?;

        if dummy_ops {
            let mut remaining = DUMMY_OPS_TOTAL;
            for i in 0..DUMMY_OP_SLOTS - 1 {
                // remaining never drops below 6, so the divisor stays >= 1.
                let count = self.rng.next_byte() % (remaining / 6);
                self.schedule[i] = count;
                remaining -= count;
            }
            self.schedule[DUMMY_OP_SLOTS - 1] = remaining;
            let mut schedule = self.schedule;
            self.shuffle(&mut schedule);
            self.schedule = schedule;
            self.cursor = 0;
        }

        Ok(())
    }

    /// Draws a fresh access order for the 16 S-Box substitutions.
    pub fn shuffle_sbox_access(&mut self, indices: &mut [u8; 16]) {
        for (i, slot) in indices.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut shuffled = *indices;
        self.shuffle(&mut shuffled);
        *indices = shuffled;
    }

    /// Burns the current slot's worth of no-op cycles and advances.
    ///
    /// The busy loop goes through `black_box` so the optimizer cannot
    /// elide it; on the target this is a chain of `nop` instructions.
    pub fn dummy_op(&mut self) {
        for i in 0..self.schedule[self.cursor] {
            core::hint::black_box(i);
        }
        self.cursor += 1;
    }

    /// Fisher–Yates shuffle driven by the 8-bit PRNG.
    fn shuffle(&mut self, array: &mut [u8]) {
        let size = array.len();
        for i in 0..size - 1 {
            let j = i + self.rng.next_byte() as usize / (MAX_RAND / (size - i) + 1);
            array.swap(i, j);
        }
    }

    #[cfg(test)]
    pub(crate) fn schedule(&self) -> &[u8; DUMMY_OP_SLOTS] {
        &self.schedule
    }

    #[cfg(test)]
    pub(crate) fn consumed_slots(&self) -> usize {
        self.cursor
    }
}
