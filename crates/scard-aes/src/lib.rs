//! DPA-hardened AES-128 decryption core for a contact smart card.
//!
//! This crate implements the card's single responsibility: decrypt one
//! 16-byte block per request while defending against Differential Power
//! Analysis. Two countermeasure families are woven through the inverse
//! round layers:
//!
//! - **Masking** — a masked inverse S-Box plus per-row MixCol mask pairs
//!   that survive the diffusion step (see [`masking`]).
//! - **Hiding** — shuffled S-Box access order and dummy-cycle padding with
//!   a fixed per-decryption total (see [`hiding`]).
//!
//! The defense is statistical, not cycle-exact: the design assumes a leaky
//! platform and randomizes what an attacker can correlate, it does not try
//! to be constant time. Countermeasures are selected at runtime via
//! [`Countermeasures`] so one binary covers every combination.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod hiding;
pub mod key;
pub mod lut;
pub mod masking;
pub mod math;
pub mod rng;
pub mod state;

pub use crate::cipher::{Aes128Decryptor, Countermeasures};
pub use crate::key::{key_schedule, Aes128Key, SubKeys};
pub use crate::rng::{EntropyError, EntropySource, OsEntropy, SeededEntropy, Xorshift8};
pub use crate::state::State;
