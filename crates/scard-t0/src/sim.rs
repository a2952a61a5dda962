//! Host-side simulation of the bench: the wire, the timer, and a terminal.
//!
//! On the card the two service routines are driven by hardware; here a
//! [`SoftTerminal`] is the clock master. It drives edges onto a shared
//! [`SimWire`] and pumps the card's interrupt entry points at every bit
//! boundary, while the card's foreground runs unmodified on its own
//! thread, spinning on the same atomic flags it would on the target.

use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::atomic::{AtomicBool, AtomicU16};
use std::sync::Arc;

use crate::hal::{EtuTimer, IoLine, LineDir};
use crate::protocol::{
    ACK_DATA_IN, ACK_DATA_OUT, BLOCK_BYTES, DATA_IN_HEADER, DATA_OUT_HEADER,
};
use crate::transport::{even_parity, Transport};
use crate::vectors;

/// The transport type every simulated card uses.
pub type SimTransport = Transport<SimLine, SimTimer>;

/// One half-duplex line with a pull-up, shared by card and terminal.
///
/// Each end either drives a level or releases the line; released by both,
/// it reads high. The card side keeps an output register that persists
/// across direction changes, like a GPIO port bit.
#[derive(Debug)]
pub struct SimWire {
    card_driving: AtomicBool,
    card_level: AtomicBool,
    terminal_driving: AtomicBool,
    terminal_level: AtomicBool,
    card_interrupt: AtomicBool,
    /// Latches any low level the card drives. The NACK pulse lives
    /// entirely inside one service-routine call, so the terminal samples
    /// it through this latch rather than the live level.
    card_drove_low: AtomicBool,
}

impl SimWire {
    /// Creates a released line.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            card_driving: AtomicBool::new(false),
            card_level: AtomicBool::new(true),
            terminal_driving: AtomicBool::new(false),
            terminal_level: AtomicBool::new(true),
            card_interrupt: AtomicBool::new(false),
            card_drove_low: AtomicBool::new(false),
        })
    }

    /// Resolved line level: card drive wins, then terminal drive, then
    /// the pull-up.
    pub fn level(&self) -> bool {
        if self.card_driving.load(Acquire) {
            self.card_level.load(Acquire)
        } else if self.terminal_driving.load(Acquire) {
            self.terminal_level.load(Acquire)
        } else {
            true
        }
    }

    /// True while the card listens with its pin-change interrupt armed.
    pub fn card_listening(&self) -> bool {
        self.card_interrupt.load(Acquire) && !self.card_driving.load(Acquire)
    }

    /// Drives a level from the terminal side.
    pub fn drive_from_terminal(&self, level: bool) {
        self.terminal_level.store(level, Release);
        self.terminal_driving.store(true, Release);
    }

    /// Releases the terminal's drive; the line falls back to the card or
    /// the pull-up.
    pub fn release_terminal(&self) {
        self.terminal_driving.store(false, Release);
    }

    fn clear_low_latch(&self) {
        self.card_drove_low.store(false, Release);
    }

    fn card_drove_low(&self) -> bool {
        self.card_drove_low.load(Acquire)
    }
}

/// The card's I/O pin, wired to a [`SimWire`].
#[derive(Clone, Debug)]
pub struct SimLine {
    wire: Arc<SimWire>,
}

impl SimLine {
    /// Attaches a pin to the wire.
    pub fn new(wire: Arc<SimWire>) -> Self {
        Self { wire }
    }
}

impl IoLine for SimLine {
    fn set_direction(&self, direction: LineDir) {
        self.wire
            .card_driving
            .store(direction == LineDir::Output, Release);
    }

    fn set_level(&self, high: bool) {
        self.wire.card_level.store(high, Release);
        if !high && self.wire.card_driving.load(Acquire) {
            self.wire.card_drove_low.store(true, Release);
        }
    }

    fn sample(&self) -> bool {
        self.wire.level()
    }

    fn set_interrupt(&self, enabled: bool) {
        self.wire.card_interrupt.store(enabled, Release);
    }
}

/// Compare-match timer stub: tracks the running flag and match value so
/// the terminal can pace its pumping and the tests can inspect timing.
#[derive(Clone, Debug, Default)]
pub struct SimTimer {
    inner: Arc<SimTimerState>,
}

#[derive(Debug, Default)]
struct SimTimerState {
    running: AtomicBool,
    match_ticks: AtomicU16,
}

impl SimTimer {
    /// True while the timer counts.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Acquire)
    }

    /// Currently armed compare-match value.
    pub fn match_ticks(&self) -> u16 {
        self.inner.match_ticks.load(Acquire)
    }
}

impl EtuTimer for SimTimer {
    fn start(&self) {
        self.inner.running.store(true, Release);
    }

    fn stop(&self) {
        self.inner.running.store(false, Release);
    }

    fn set_match(&self, ticks: u16) {
        self.inner.match_ticks.store(ticks, Release);
    }
}

/// Terminal model driving the card's half of the wire.
///
/// Implements the terminal side of the framing — including deliberate
/// parity corruption and guard-interval NACK observation for the tests —
/// and the three APDU exchanges of the protocol.
pub struct SoftTerminal {
    card: Arc<SimTransport>,
    wire: Arc<SimWire>,
    timer: SimTimer,
    use_vectors: bool,
}

impl SoftTerminal {
    /// Connects a terminal that calls the card's service routines
    /// directly.
    pub fn new(card: Arc<SimTransport>, wire: Arc<SimWire>, timer: SimTimer) -> Self {
        Self {
            card,
            wire,
            timer,
            use_vectors: false,
        }
    }

    /// Connects a terminal that routes through the interrupt-vector
    /// statics, as the firmware's dispatch does. One card per process.
    pub fn via_vectors(card: Arc<SimTransport>, wire: Arc<SimWire>, timer: SimTimer) -> Self {
        vectors::bind(Arc::clone(&card));
        Self {
            card,
            wire,
            timer,
            use_vectors: true,
        }
    }

    fn pin_change(&self) {
        if self.use_vectors {
            vectors::pin_change_vector();
        } else {
            self.card.on_pin_change();
        }
    }

    fn timer_match(&self) {
        debug_assert!(self.timer.is_running(), "timer match pumped while stopped");
        if self.use_vectors {
            vectors::timer_compare_vector();
        } else {
            self.card.on_timer_match();
        }
    }

    fn wait_until(&self, ready: impl Fn() -> bool) {
        while !ready() {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    // ------------------------------------------------------------------
    // Byte-level framing
    // ------------------------------------------------------------------

    /// Sends one byte, retransmitting until the card accepts the parity.
    pub fn send_byte(&self, byte: u8) {
        while !self.send_frame(byte, even_parity(byte)) {}
    }

    /// Sends one frame with an explicit parity bit.
    ///
    /// Returns false when the card pulled the line low during what would
    /// be the stop bit — the parity NACK.
    pub fn send_frame(&self, byte: u8, parity_bit: bool) -> bool {
        self.wait_until(|| self.wire.card_listening());

        // Falling edge of the start bit.
        self.wire.drive_from_terminal(false);
        self.pin_change();

        // Eight data bits LSB-first, then parity, each sampled mid-cell.
        for position in 0..9u8 {
            let bit = if position < 8 {
                byte >> position & 1 == 1
            } else {
                parity_bit
            };
            self.wire.drive_from_terminal(bit);
            self.timer_match();
        }

        if parity_bit == even_parity(byte) {
            self.wire.release_terminal();
            return true;
        }

        // The card claimed the line; pump the stop-bit slot and watch for
        // the low pulse.
        self.wire.release_terminal();
        self.wire.clear_low_latch();
        self.timer_match();
        !self.wire.card_drove_low()
    }

    /// Receives one byte from the card, acknowledging it.
    pub fn receive_byte(&self) -> u8 {
        self.receive_frame(true)
    }

    /// Receives one frame; with `ack` false, pulls the line low during
    /// the guard interval so the card retransmits.
    pub fn receive_frame(&self, ack: bool) -> u8 {
        let mut bits = [false; 11];
        for slot in bits.iter_mut() {
            self.wait_until(|| self.card.bit_pending() && self.timer.is_running());
            self.timer_match();
            *slot = self.wire.level();
        }
        assert!(!bits[0], "frame did not begin with a start bit");
        assert!(bits[10], "frame did not end with a stop bit");

        let mut byte = 0u8;
        for (position, &bit) in bits[1..9].iter().enumerate() {
            byte |= u8::from(bit) << position;
        }
        assert_eq!(bits[9], even_parity(byte), "card sent wrong parity");

        // Guard interval: the card samples the line for our verdict.
        self.wait_until(|| {
            self.card.checking_guard()
                && self.card.direction() == LineDir::Input
                && self.timer.is_running()
        });
        if ack {
            self.wire.release_terminal();
        } else {
            self.wire.drive_from_terminal(false);
        }
        self.timer_match();
        self.wire.release_terminal();

        byte
    }

    // ------------------------------------------------------------------
    // APDU exchanges (terminal half)
    // ------------------------------------------------------------------

    /// Reads the four answer-to-reset bytes.
    pub fn read_atr(&self) -> [u8; 4] {
        let mut atr = [0u8; 4];
        for slot in atr.iter_mut() {
            *slot = self.receive_byte();
        }
        atr
    }

    /// Delivers a ciphertext block: header, then an ACK-prefixed byte
    /// exchange for each of the 16 data bytes.
    pub fn send_data_in(&self, data: &[u8; BLOCK_BYTES]) {
        for &byte in DATA_IN_HEADER.iter() {
            self.send_byte(byte);
        }
        for &byte in data.iter() {
            let ack = self.receive_byte();
            assert_eq!(ack, ACK_DATA_IN, "unexpected data-in procedure byte");
            self.send_byte(byte);
        }
    }

    /// Reads the two status bytes that announce a finished decryption.
    pub fn read_decrypted_response(&self) -> [u8; 2] {
        [self.receive_byte(), self.receive_byte()]
    }

    /// Fetches the plaintext block and the closing status trailer.
    pub fn request_data_out(&self) -> ([u8; BLOCK_BYTES], [u8; 2]) {
        for &byte in DATA_OUT_HEADER.iter() {
            self.send_byte(byte);
        }
        let ack = self.receive_byte();
        assert_eq!(ack, ACK_DATA_OUT, "unexpected data-out procedure byte");

        let mut data = [0u8; BLOCK_BYTES];
        for slot in data.iter_mut() {
            *slot = self.receive_byte();
        }
        let trailer = [self.receive_byte(), self.receive_byte()];
        (data, trailer)
    }
}

/// Builds a simulated card and the handles the terminal side needs.
pub fn sim_card(timing: crate::hal::Timing) -> (Arc<SimTransport>, Arc<SimWire>, SimTimer) {
    let wire = SimWire::new();
    let timer = SimTimer::default();
    let card = Arc::new(Transport::new(
        SimLine::new(Arc::clone(&wire)),
        timer.clone(),
        timing,
    ));
    (card, wire, timer)
}
