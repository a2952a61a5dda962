//! Host simulator for the DPA-hardened smart card.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use scard_aes::{
    Aes128Decryptor, Aes128Key, Countermeasures, EntropyError, EntropySource, OsEntropy,
    SeededEntropy,
};
use scard_t0::sim::{sim_card, SoftTerminal};
use scard_t0::Timing;

/// The lab key baked into the card firmware.
const DEFAULT_KEY_HEX: &str = "ffcd13bdd3c87fb44125e84618fab7d4";

/// Smart-card simulator CLI.
#[derive(Parser)]
#[command(
    name = "scard",
    version,
    author,
    about = "DPA-hardened AES-128 smart card simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Countermeasure toggles, mirroring the firmware's build flags.
#[derive(Args, Clone, Copy)]
struct Protection {
    /// Enable boolean masking.
    #[arg(long)]
    masking: bool,
    /// Enable S-Box access shuffling.
    #[arg(long)]
    shuffling: bool,
    /// Enable dummy-op padding.
    #[arg(long)]
    dummy_ops: bool,
    /// Weaken masks and align dummy ops for DPA evaluation runs.
    #[arg(long)]
    dpa: bool,
}

impl From<Protection> for Countermeasures {
    fn from(flags: Protection) -> Self {
        Self {
            masking: flags.masking,
            shuffling: flags.shuffling,
            dummy_ops: flags.dummy_ops,
            dpa: flags.dpa,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt one block directly with the hardened core.
    Decrypt {
        /// AES-128 key as 32 hex characters.
        #[arg(long, value_name = "HEX", default_value = DEFAULT_KEY_HEX)]
        key_hex: String,
        /// Ciphertext block as 32 hex characters.
        #[arg(long, value_name = "HEX")]
        cipher_hex: String,
        #[command(flatten)]
        protection: Protection,
        /// Optional seed for reproducible countermeasure nonces.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Boot a card and run a full T=0 session over the simulated wire.
    Exchange {
        /// AES-128 key as 32 hex characters.
        #[arg(long, value_name = "HEX", default_value = DEFAULT_KEY_HEX)]
        key_hex: String,
        /// Ciphertext block as 32 hex characters.
        #[arg(long, value_name = "HEX")]
        cipher_hex: String,
        #[command(flatten)]
        protection: Protection,
        /// Optional seed for reproducible countermeasure nonces.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Decrypt {
            key_hex,
            cipher_hex,
            protection,
            seed,
        } => cmd_decrypt(&key_hex, &cipher_hex, protection.into(), seed),
        Commands::Exchange {
            key_hex,
            cipher_hex,
            protection,
            seed,
        } => cmd_exchange(&key_hex, &cipher_hex, protection.into(), seed),
    }
}

fn cmd_decrypt(
    key_hex: &str,
    cipher_hex: &str,
    countermeasures: Countermeasures,
    seed: Option<u64>,
) -> Result<()> {
    let key = parse_key_hex(key_hex)?;
    let mut block = parse_block_hex(cipher_hex)?;
    let mut aes = Aes128Decryptor::new(&key, countermeasures, entropy_source(seed));
    aes.decrypt(&mut block).context("decrypt block")?;
    println!("plaintext: {}", hex::encode(block));
    Ok(())
}

fn cmd_exchange(
    key_hex: &str,
    cipher_hex: &str,
    countermeasures: Countermeasures,
    seed: Option<u64>,
) -> Result<()> {
    let key = parse_key_hex(key_hex)?;
    let block = parse_block_hex(cipher_hex)?;

    let (card, wire, timer) = sim_card(Timing::default());
    let terminal = SoftTerminal::via_vectors(Arc::clone(&card), wire, timer);

    // The card's main loop, bounded to one request for the simulation.
    let entropy = entropy_source(seed);
    let card_thread = thread::spawn(move || -> Result<(), EntropyError> {
        let mut aes = Aes128Decryptor::new(&key, countermeasures, entropy);
        card.send_atr();
        let mut data = [0u8; 16];
        card.receive_data_to_decrypt(&mut data);
        aes.decrypt(&mut data)?;
        card.send_decrypted_data(&data);
        Ok(())
    });

    println!("ATR: {}", hex::encode(terminal.read_atr()));
    terminal.send_data_in(&block);
    println!(
        "status: {}",
        hex::encode(terminal.read_decrypted_response())
    );
    let (plaintext, trailer) = terminal.request_data_out();
    println!("plaintext: {}", hex::encode(plaintext));
    println!("trailer: {}", hex::encode(trailer));

    card_thread
        .join()
        .map_err(|_| anyhow!("card thread panicked"))?
        .context("card decryption")?;
    scard_t0::vectors::unbind();
    Ok(())
}

fn entropy_source(seed: Option<u64>) -> Box<dyn EntropySource + Send> {
    match seed {
        Some(value) => Box::new(SeededEntropy::from_seed(value)),
        None => Box::new(OsEntropy),
    }
}

fn parse_key_hex(hex_str: &str) -> Result<Aes128Key> {
    Ok(Aes128Key::from(parse_block_hex(hex_str)?))
}

fn parse_block_hex(hex_str: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(hex_str.trim()).context("decode hex")?;
    if bytes.len() != 16 {
        bail!("expected 16 bytes (32 hex characters), got {}", bytes.len());
    }
    let mut block = [0u8; 16];
    block.copy_from_slice(&bytes);
    Ok(block)
}
