//! End-to-end sessions: ATR, data-in, decryption, data-out.

use std::sync::Arc;
use std::thread;

use hex_literal::hex;
use scard_aes::{Aes128Decryptor, Aes128Key, Countermeasures, SeededEntropy};
use scard_t0::protocol::{ATR, BLOCK_BYTES, RESPONSE_DATA_OUT, RESPONSE_DECRYPTED};
use scard_t0::sim::{sim_card, SimTransport, SoftTerminal};
use scard_t0::Timing;

const KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
const CIPHER: [u8; 16] = hex!("3ad77bb40d7a3660a89ecaf32466ef97");
const PLAIN: [u8; 16] = hex!("6bc1bee22e409f96e93d7e117393172a");

/// The firmware main loop, bounded to a fixed number of requests so the
/// test can join the card thread.
fn run_card(card: Arc<SimTransport>, countermeasures: Countermeasures, requests: usize) {
    let mut aes = Aes128Decryptor::new(
        &Aes128Key::from(KEY),
        countermeasures,
        SeededEntropy::from_seed(77),
    );
    card.send_atr();
    let mut block = [0u8; BLOCK_BYTES];
    for _ in 0..requests {
        card.receive_data_to_decrypt(&mut block);
        aes.decrypt(&mut block).expect("seeded entropy cannot fail");
        card.send_decrypted_data(&block);
    }
}

#[test]
fn full_session_decrypts_two_blocks() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::new(Arc::clone(&card), wire, timer);

    let card_thread = thread::spawn(move || run_card(card, Countermeasures::full(), 2));

    assert_eq!(terminal.read_atr(), ATR);
    for _ in 0..2 {
        terminal.send_data_in(&CIPHER);
        assert_eq!(terminal.read_decrypted_response(), RESPONSE_DECRYPTED);
        let (plaintext, trailer) = terminal.request_data_out();
        assert_eq!(plaintext, PLAIN);
        assert_eq!(trailer, RESPONSE_DATA_OUT);
    }
    card_thread.join().unwrap();
}

#[test]
fn session_over_interrupt_vectors() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::via_vectors(Arc::clone(&card), wire, timer);

    let card_thread = thread::spawn(move || run_card(card, Countermeasures::none(), 1));

    assert_eq!(terminal.read_atr(), ATR);
    terminal.send_data_in(&CIPHER);
    assert_eq!(terminal.read_decrypted_response(), RESPONSE_DECRYPTED);
    let (plaintext, trailer) = terminal.request_data_out();
    assert_eq!(plaintext, PLAIN);
    assert_eq!(trailer, RESPONSE_DATA_OUT);
    card_thread.join().unwrap();

    scard_t0::vectors::unbind();
}
