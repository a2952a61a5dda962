//! The half-duplex byte transport: framing, parity, retransmission.
//!
//! The foreground (protocol plus AES) and the two interrupt contexts share
//! nothing but the flag bag below. Every flag is a single-byte atomic with
//! acquire/release ordering; suspension points are explicit spin waits on
//! those flags, released by one of the ISR entry points. There is no
//! timeout — a hung line blocks forever, and recovery belongs to the
//! terminal.

use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::atomic::{AtomicBool, AtomicU8};

use crate::hal::{EtuTimer, IoLine, LineDir, Timing};

/// A start bit pulls the line low.
const START_BIT: bool = false;
/// A stop bit releases the line high.
const STOP_BIT: bool = true;

/// Computes the parity bit by folding XORs.
///
/// Returns `true` exactly when the byte's popcount is even. Both ends of
/// the wire frame with this one function.
pub fn even_parity(mut byte: u8) -> bool {
    byte ^= byte >> 4;
    byte ^= byte >> 2;
    byte ^= byte >> 1;
    byte & 0x01 == 0
}

/// Shared state between the foreground and the interrupt contexts.
#[derive(Debug)]
struct LineFlags {
    /// Current direction of the I/O line, as [`LineDir`] discriminants.
    direction: AtomicU8,
    /// True once the timer ISR has latched the pending output bit.
    bit_sent: AtomicBool,
    /// Next bit to put on the line.
    output_bit: AtomicBool,
    /// Raised by the receive path once a byte has been framed.
    byte_received: AtomicBool,
    /// Position 0..=9 within the current receive frame.
    input_bit_counter: AtomicU8,
    /// Accumulator for the byte being received.
    input_byte: AtomicU8,
    /// True while sampling the guard interval after a transmission.
    check_errors: AtomicBool,
    /// Guard-interval sample: high means the terminal accepted the byte.
    error_bit: AtomicBool,
    /// Set when a received parity bit disagreed with the data.
    parity_error: AtomicBool,
}

impl LineFlags {
    fn new() -> Self {
        Self {
            direction: AtomicU8::new(LineDir::Output as u8),
            bit_sent: AtomicBool::new(true),
            output_bit: AtomicBool::new(false),
            byte_received: AtomicBool::new(false),
            input_bit_counter: AtomicU8::new(0),
            input_byte: AtomicU8::new(0),
            check_errors: AtomicBool::new(false),
            error_bit: AtomicBool::new(false),
            parity_error: AtomicBool::new(false),
        }
    }
}

/// Bit-banged T=0 transport over one I/O line and one compare-match timer.
pub struct Transport<L: IoLine, T: EtuTimer> {
    line: L,
    timer: T,
    timing: Timing,
    flags: LineFlags,
}

impl<L: IoLine, T: EtuTimer> Transport<L, T> {
    /// Sets up the line (listening, pull-up active) and arms the timer
    /// match at one elementary time unit.
    pub fn new(line: L, timer: T, timing: Timing) -> Self {
        let transport = Self {
            line,
            timer,
            timing,
            flags: LineFlags::new(),
        };
        transport.set_direction(LineDir::Input);
        transport.line.set_level(true);
        transport.timer.set_match(timing.etu);
        transport
    }

    /// Returns the configured bit-cell timing.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    // ------------------------------------------------------------------
    // Foreground send path
    // ------------------------------------------------------------------

    /// Queues one bit for the timer ISR, waiting out the previous one.
    fn send_bit(&self, bit: bool) {
        self.wait_until(|| self.flags.bit_sent.load(Acquire));
        self.flags.output_bit.store(bit, Release);
        self.flags.bit_sent.store(false, Release);
    }

    /// Sends one byte: start bit, 8 data bits LSB-first, even parity,
    /// stop bit; then samples the guard interval and retransmits for as
    /// long as the terminal pulls it low.
    pub fn send_byte(&self, byte: u8) {
        self.line.set_interrupt(false);

        loop {
            self.set_direction(LineDir::Output);
            self.timer.start();
            self.timer.set_match(self.timing.etu);

            self.send_bit(START_BIT);
            let mut mask = 0x01u8;
            while mask != 0 {
                self.send_bit(byte & mask != 0);
                mask <<= 1;
            }
            self.send_bit(even_parity(byte));
            self.send_bit(STOP_BIT);
            self.wait_until(|| self.flags.bit_sent.load(Acquire));

            // Listen during the guard interval; a low level there is the
            // terminal's parity NACK.
            self.flags.error_bit.store(true, Release);
            self.flags.check_errors.store(true, Release);
            self.timer.set_match(self.timing.guard_sample_match());
            self.set_direction(LineDir::Input);
            self.timer.start();
            self.wait_until(|| !self.flags.check_errors.load(Acquire));

            if self.flags.error_bit.load(Acquire) {
                break;
            }
        }

        self.timer.stop();
    }

    /// Sends a run of bytes back to back.
    pub fn send_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.send_byte(byte);
        }
    }

    // ------------------------------------------------------------------
    // Foreground receive path
    // ------------------------------------------------------------------

    /// Blocks until the receive path has framed one byte.
    pub fn receive_byte(&self) -> u8 {
        self.flags.byte_received.store(false, Release);
        self.set_direction(LineDir::Input);
        self.line.set_interrupt(true);
        self.wait_until(|| self.flags.byte_received.load(Acquire));
        self.flags.input_byte.load(Acquire)
    }

    // ------------------------------------------------------------------
    // Interrupt entry points
    // ------------------------------------------------------------------

    /// Pin-change service routine: catches the falling edge of a start
    /// bit, arms the timer to sample mid-cell, and resets the accumulator.
    pub fn on_pin_change(&self) {
        if !self.line.sample() && self.direction() == LineDir::Input {
            self.timer.start();
            self.timer.set_match(self.timing.start_bit_match());
            self.flags.input_bit_counter.store(0, Release);
            self.flags.input_byte.store(0, Release);
            // No further edges matter until the next start bit.
            self.line.set_interrupt(false);
        }
    }

    /// Compare-match service routine: latches outgoing bits, samples
    /// incoming ones, checks parity, and drives or reads the NACK slot.
    pub fn on_timer_match(&self) {
        match self.direction() {
            LineDir::Output => {
                if self.flags.parity_error.load(Acquire) {
                    // Pull low during the stop-bit slot, then go back to
                    // listening for the retransmission.
                    self.line.set_level(false);
                    self.timer.stop();
                    self.flags.parity_error.store(false, Release);
                    self.set_direction(LineDir::Input);
                    self.line.set_interrupt(true);
                } else {
                    self.line.set_level(self.flags.output_bit.load(Acquire));
                    self.flags.bit_sent.store(true, Release);
                }
            }
            LineDir::Input => {
                if self.flags.check_errors.load(Acquire) {
                    self.timer.stop();
                    self.flags.error_bit.store(self.sample_bit(), Release);
                    self.flags.check_errors.store(false, Release);
                    return;
                }

                let counter = self.flags.input_bit_counter.load(Acquire);
                if counter == 0 {
                    // First data bit sampled; from here on match every ETU.
                    self.timer.set_match(self.timing.etu);
                }
                let current = self.sample_bit();
                if counter < 8 {
                    let accumulated =
                        self.flags.input_byte.load(Acquire) | (u8::from(current) << counter);
                    self.flags.input_byte.store(accumulated, Release);
                } else if current != even_parity(self.flags.input_byte.load(Acquire)) {
                    // Claim the line; the next match drives the NACK.
                    self.flags.parity_error.store(true, Release);
                    self.set_direction(LineDir::Output);
                } else {
                    self.timer.stop();
                    self.flags.byte_received.store(true, Release);
                }
                self.flags.input_bit_counter.store(counter + 1, Release);
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection for the simulation pump
    // ------------------------------------------------------------------

    /// True while a queued output bit awaits the timer ISR.
    pub fn bit_pending(&self) -> bool {
        !self.flags.bit_sent.load(Acquire)
    }

    /// True while the transport is sampling the post-transmission guard
    /// interval.
    pub fn checking_guard(&self) -> bool {
        self.flags.check_errors.load(Acquire)
    }

    /// Current line direction.
    pub fn direction(&self) -> LineDir {
        if self.flags.direction.load(Acquire) == LineDir::Output as u8 {
            LineDir::Output
        } else {
            LineDir::Input
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_direction(&self, direction: LineDir) {
        self.line.set_direction(direction);
        self.flags.direction.store(direction as u8, Release);
    }

    /// Samples the pin three times and takes the majority, which rides out
    /// short glitches on the line.
    fn sample_bit(&self) -> bool {
        let mut majority = 0i8;
        majority += if self.line.sample() { 1 } else { -1 };
        majority += if self.line.sample() { 1 } else { -1 };
        majority += if self.line.sample() { 1 } else { -1 };
        majority > 0
    }

    fn wait_until(&self, ready: impl Fn() -> bool) {
        while !ready() {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_tracks_popcount() {
        for byte in 0..=255u8 {
            assert_eq!(even_parity(byte), byte.count_ones() % 2 == 0);
        }
    }

    #[test]
    fn parity_spot_values() {
        assert!(even_parity(0x00));
        assert!(even_parity(0x03));
        assert!(!even_parity(0x01));
        assert!(!even_parity(0xef));
        assert!(even_parity(0xff));
    }
}
