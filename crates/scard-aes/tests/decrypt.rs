//! End-to-end decryption vectors and round-trip properties.

mod common;

use common::encrypt_reference;
use hex_literal::hex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use scard_aes::{Aes128Decryptor, Aes128Key, Countermeasures, SeededEntropy};

/// The lab key compiled into the card firmware.
const LAB_KEY: [u8; 16] = hex!("ffcd13bdd3c87fb44125e84618fab7d4");

fn decrypt_with(key: &[u8; 16], cipher: &[u8; 16], cm: Countermeasures, seed: u64) -> [u8; 16] {
    let mut aes = Aes128Decryptor::new(&Aes128Key::from(*key), cm, SeededEntropy::from_seed(seed));
    let mut block = *cipher;
    aes.decrypt(&mut block).expect("seeded entropy cannot fail");
    block
}

#[test]
fn lab_key_zero_block_matches_reference() {
    let cipher = [0u8; 16];
    let plain = decrypt_with(&LAB_KEY, &cipher, Countermeasures::none(), 1);
    assert_eq!(encrypt_reference(&LAB_KEY, &plain), cipher);
}

#[test]
fn all_zero_key_and_block_match_reference() {
    let key = [0u8; 16];
    let cipher = [0u8; 16];
    let plain = decrypt_with(&key, &cipher, Countermeasures::none(), 2);
    assert_eq!(encrypt_reference(&key, &plain), cipher);
}

#[test]
fn nist_sp800_38a_ecb_block_one() {
    let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    let cipher = hex!("3ad77bb40d7a3660a89ecaf32466ef97");
    let expected = hex!("6bc1bee22e409f96e93d7e117393172a");
    assert_eq!(
        decrypt_with(&key, &cipher, Countermeasures::none(), 3),
        expected
    );
    assert_eq!(
        decrypt_with(&key, &cipher, Countermeasures::full(), 4),
        expected
    );
}

#[test]
fn decrypt_inverts_reference_encryption() {
    let mut rng = ChaCha20Rng::from_seed([50u8; 32]);
    for i in 0..100 {
        let mut key = [0u8; 16];
        let mut plaintext = [0u8; 16];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut plaintext);
        let cipher = encrypt_reference(&key, &plaintext);
        assert_eq!(
            decrypt_with(&key, &cipher, Countermeasures::none(), i),
            plaintext
        );
    }
}

#[test]
fn countermeasures_never_change_the_plaintext() {
    let mut rng = ChaCha20Rng::from_seed([51u8; 32]);
    for i in 0..16u8 {
        let cm = Countermeasures {
            masking: i & 1 != 0,
            shuffling: i & 2 != 0,
            dummy_ops: i & 4 != 0,
            dpa: i & 8 != 0,
        };
        for trial in 0..8 {
            let mut key = [0u8; 16];
            let mut plaintext = [0u8; 16];
            rng.fill_bytes(&mut key);
            rng.fill_bytes(&mut plaintext);
            let cipher = encrypt_reference(&key, &plaintext);
            let seed = u64::from(i) * 100 + trial;
            assert_eq!(
                decrypt_with(&key, &cipher, cm, seed),
                plaintext,
                "combination {cm:?}"
            );
        }
    }
}
