//! Bit-banged ISO/IEC 7816-3 T=0 transport for the smart card.
//!
//! A single I/O line with a pull-up, paced by a compare-match timer and a
//! pin-change interrupt: start bit, 8 data bits LSB-first, even parity,
//! stop bit, with parity errors renegotiated in the guard interval. The
//! foreground blocks on atomic flags that the two interrupt entry points
//! release — interrupts on a run-to-completion main, no scheduler.
//!
//! [`hal`] holds the hardware seams, [`transport`] the framing state
//! machine, [`protocol`] the ATR and APDU exchanges, and [`sim`] a
//! host-side bench (wire, timer, soft terminal) that stands in for the
//! real electrical environment in tests and the simulator binary.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod hal;
pub mod protocol;
pub mod sim;
pub mod transport;
pub mod vectors;

pub use crate::hal::{EtuTimer, IoLine, LineDir, Timing};
pub use crate::sim::{sim_card, SimLine, SimTimer, SimTransport, SimWire, SoftTerminal};
pub use crate::transport::{even_parity, Transport};
