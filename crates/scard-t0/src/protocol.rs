//! T=0 protocol bytes and the card-side APDU exchanges.

use crate::hal::{EtuTimer, IoLine};
use crate::transport::Transport;

/// Answer-to-reset sequence: direct convention, T=0, Fi=372/Di=1.
pub const ATR: [u8; 4] = [0x3b, 0x90, 0x11, 0x00];

/// Header of the command that delivers a ciphertext block to the card.
pub const DATA_IN_HEADER: [u8; 5] = [0x88, 0x10, 0x00, 0x00, 0x10];

/// Header of the command that fetches the decrypted block.
pub const DATA_OUT_HEADER: [u8; 5] = [0x88, 0xc0, 0x00, 0x00, 0x10];

/// Procedure byte for incoming data, the INS complemented per ISO 7816-3.
pub const ACK_DATA_IN: u8 = 0x10 ^ 0xff;

/// Procedure byte for outgoing data, the INS itself.
pub const ACK_DATA_OUT: u8 = 0xc0;

/// Status words announcing that 16 decrypted bytes are available.
pub const RESPONSE_DECRYPTED: [u8; 2] = [0x61, 0x10];

/// Status trailer closing the data-out exchange.
pub const RESPONSE_DATA_OUT: [u8; 2] = [0x9d, 0x00];

/// Bytes per data block on the wire.
pub const BLOCK_BYTES: usize = 16;

impl<L: IoLine, T: EtuTimer> Transport<L, T> {
    /// Emits the answer-to-reset sequence.
    pub fn send_atr(&self) {
        self.send_bytes(&ATR);
    }

    /// Runs the data-in exchange and fills `data` with the ciphertext.
    ///
    /// The five header bytes arrive without acknowledgement; each data
    /// byte is acknowledged *before* it is received. That inverted order
    /// is what the deployed terminal expects, so it stays.
    pub fn receive_data_to_decrypt(&self, data: &mut [u8; BLOCK_BYTES]) {
        self.receive_header(&DATA_IN_HEADER);
        for slot in data.iter_mut() {
            self.send_byte(ACK_DATA_IN);
            *slot = self.receive_byte();
        }
    }

    /// Announces the finished decryption and runs the data-out exchange.
    pub fn send_decrypted_data(&self, data: &[u8; BLOCK_BYTES]) {
        self.send_bytes(&RESPONSE_DECRYPTED);
        self.receive_header(&DATA_OUT_HEADER);
        self.send_byte(ACK_DATA_OUT);
        self.send_bytes(data);
        self.send_bytes(&RESPONSE_DATA_OUT);
    }

    /// Receives a five-byte command header.
    ///
    /// Bytes that differ from `expected` are tolerated; the loop keeps
    /// going and the terminal's retry logic owns recovery.
    fn receive_header(&self, expected: &[u8; 5]) {
        for _ in expected.iter() {
            self.receive_byte();
        }
    }
}
