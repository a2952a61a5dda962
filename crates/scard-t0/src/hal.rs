//! Hardware seams: the single I/O line, the bit-cell timer, and timing.

/// Who currently drives the I/O line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineDir {
    /// The card drives the line.
    Output = 0,
    /// The card listens; the line floats to the pull-up unless the
    /// terminal drives it.
    Input = 1,
}

/// The card's bidirectional data pin.
///
/// On the target this is a GPIO with a pin-change interrupt; the methods
/// map one-to-one onto the direction, port, pin and interrupt-mask
/// registers.
pub trait IoLine {
    /// Switches the pin between driving and listening.
    fn set_direction(&self, direction: LineDir);
    /// Sets the output register. Takes effect on the wire while the pin is
    /// an output; doubles as the pull-up selection while it is an input.
    fn set_level(&self, high: bool);
    /// Reads the pin once.
    fn sample(&self) -> bool;
    /// Masks or unmasks the pin-change interrupt.
    fn set_interrupt(&self, enabled: bool);
}

/// The compare-match timer that paces bit cells.
pub trait EtuTimer {
    /// Resets the counter to the bottom value and starts counting.
    fn start(&self);
    /// Halts the counter.
    fn stop(&self);
    /// Sets the compare-match value in timer ticks.
    fn set_match(&self, ticks: u16);
}

/// Bit-cell timing parameters.
///
/// One elementary time unit is `F/D` timer ticks; with the default
/// `F = 372`, `D = 1` and the timer on the CPU clock that is 372 ticks.
/// The latency fudge compensates interrupt-entry delay and is empirical —
/// retune it when retargeting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Ticks per elementary time unit.
    pub etu: u16,
    /// Ticks subtracted from a match value to absorb ISR entry latency.
    pub latency_fudge: u16,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            etu: 372,
            latency_fudge: 50,
        }
    }
}

impl Timing {
    /// Match value armed on a start-bit edge: one and a half bit cells,
    /// minus the fudge, so every later sample lands mid-cell.
    pub fn start_bit_match(&self) -> u16 {
        self.etu + self.etu / 2 - self.latency_fudge
    }

    /// Match value for sampling the guard interval after a transmitted
    /// byte, where the terminal may pull low to signal a parity error.
    pub fn guard_sample_match(&self) -> u16 {
        self.etu - self.latency_fudge
    }
}
