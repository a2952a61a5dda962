//! Wire-level loopback tests: framing, timing, parity renegotiation.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use scard_t0::protocol::{ATR, BLOCK_BYTES};
use scard_t0::sim::{sim_card, SoftTerminal};
use scard_t0::transport::even_parity;
use scard_t0::Timing;

#[test]
fn atr_frames_on_the_wire() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::new(Arc::clone(&card), wire, timer);

    let sender = thread::spawn(move || card.send_atr());
    assert_eq!(terminal.read_atr(), ATR);
    sender.join().unwrap();
}

#[test]
fn apdu_stream_accumulates_the_data_bytes() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::new(Arc::clone(&card), wire, timer);

    let (result_tx, result_rx) = mpsc::channel();
    let receiver = thread::spawn(move || {
        let mut data = [0u8; BLOCK_BYTES];
        card.receive_data_to_decrypt(&mut data);
        result_tx.send(data).unwrap();
    });

    let mut payload = [0u8; BLOCK_BYTES];
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(31).wrapping_add(7);
    }
    terminal.send_data_in(&payload);

    assert_eq!(result_rx.recv().unwrap(), payload);
    receiver.join().unwrap();
}

#[test]
fn start_bit_arms_mid_cell_sampling() {
    let timing = Timing::default();
    let (card, wire, timer) = sim_card(timing);

    let (result_tx, result_rx) = mpsc::channel();
    let receiver = {
        let card = Arc::clone(&card);
        thread::spawn(move || result_tx.send(card.receive_byte()).unwrap())
    };

    // Drive the frame by hand so the match values can be checked at each
    // phase: 1.5 ETU minus the fudge on the start edge, then 1 ETU once
    // the first data bit has been sampled.
    while !wire.card_listening() {
        thread::yield_now();
    }
    let byte = 0x5au8;
    wire.drive_from_terminal(false);
    card.on_pin_change();
    assert!(timer.is_running());
    assert_eq!(timer.match_ticks(), timing.start_bit_match());

    wire.drive_from_terminal(byte & 1 == 1);
    card.on_timer_match();
    assert_eq!(timer.match_ticks(), timing.etu);

    for position in 1..9u8 {
        let bit = if position < 8 {
            byte >> position & 1 == 1
        } else {
            even_parity(byte)
        };
        wire.drive_from_terminal(bit);
        card.on_timer_match();
    }
    wire.release_terminal();
    assert!(!timer.is_running(), "timer must stop after the parity bit");

    assert_eq!(result_rx.recv().unwrap(), byte);
    receiver.join().unwrap();
}

#[test]
fn corrupted_parity_draws_a_nack() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::new(Arc::clone(&card), wire, timer);

    let (result_tx, result_rx) = mpsc::channel();
    let receiver = {
        let card = Arc::clone(&card);
        thread::spawn(move || result_tx.send(card.receive_byte()).unwrap())
    };

    // Inverted parity: the card must pull low in the stop-bit slot.
    let accepted = terminal.send_frame(0xa5, !even_parity(0xa5));
    assert!(!accepted, "card failed to signal the parity error");

    // The retransmission goes through.
    terminal.send_byte(0xa5);
    assert_eq!(result_rx.recv().unwrap(), 0xa5);
    receiver.join().unwrap();
}

#[test]
fn terminal_nack_forces_retransmission() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::new(Arc::clone(&card), wire, timer);

    let sender = thread::spawn(move || card.send_byte(0x77));

    // Refuse the first frame; the card must send the same byte again.
    assert_eq!(terminal.receive_frame(false), 0x77);
    assert_eq!(terminal.receive_byte(), 0x77);
    sender.join().unwrap();
}

#[test]
fn back_to_back_bytes_keep_framing() {
    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::new(Arc::clone(&card), wire, timer);

    let bytes: Vec<u8> = (0..32u8).map(|i| i.wrapping_mul(0x11) ^ 0x3c).collect();
    let expected = bytes.clone();
    let sender = thread::spawn(move || card.send_bytes(&bytes));

    for &expected_byte in expected.iter() {
        assert_eq!(terminal.receive_byte(), expected_byte);
    }
    sender.join().unwrap();
}
