//! `cardvault` command-line interface

use std::path::PathBuf;

use cardvault_ccid::{UsbConfig, UsbProvider};
use cardvault_openpgp::{CipherPayload, Decrypter, Pin};
use clap::{Parser, Subcommand};
use eyre::WrapErr;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod config;

use config::load_config;

#[derive(Parser)]
#[command(version, about = "Read key references and recover session keys from OpenPGP security keys")]
struct Cli {
    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = "cardvault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the public key URL stored on the card
    KeyRef,

    /// Recover session keys from encrypted session key payloads
    Decrypt {
        /// Card PIN
        #[arg(long, required = true)]
        pin: String,

        /// Encrypted session key payloads, hex encoded
        #[arg(required = true)]
        payloads: Vec<String>,
    },
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_config(&cli.config)
        .wrap_err_with(|| format!("Failed to load {}", cli.config.display()))?;
    debug!(?config, "Loaded configuration");

    let provider = UsbProvider::new(UsbConfig::from(&config.usb));
    let mut decrypter = Decrypter::new(provider, config.card)
        .with_tap_callback(Box::new(|| eprintln!("Tap your security key")));

    match cli.command {
        Commands::KeyRef => {
            let reference = decrypter.key_reference()?;
            println!("{reference}");
        }
        Commands::Decrypt { pin, payloads } => {
            let payloads = payloads
                .iter()
                .enumerate()
                .map(|(index, payload)| {
                    hex::decode(payload.trim())
                        .map(CipherPayload::new)
                        .wrap_err_with(|| format!("Payload {} is not valid hex", index + 1))
                })
                .collect::<eyre::Result<Vec<_>>>()?;

            info!(count = payloads.len(), "Decrypting session keys");
            let keys = decrypter.decrypt_all(&payloads, &Pin::new(pin))?;
            for key in keys {
                println!(
                    "algorithm={} key={}",
                    key.algorithm(),
                    hex::encode(key.as_bytes())
                );
            }
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();
}
