//! CLI wallet: keypair generation, key inspection, and building, signing
//! and submitting transfers against a node's HTTP API.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};

use boocoin_common::coins::Coins;
use boocoin_common::config::normalize_node;
use boocoin_common::crypto::keys::{generate_keypair, public_key_for, sign, PublicKey};
use boocoin_common::time;
use boocoin_common::transaction::{transaction_hash, UnconfirmedTransaction};

#[derive(Debug, Parser)]
#[command(name = "boocoin_wallet", version, about = "Boocoin CLI wallet")]
struct Options {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a fresh keypair and print both halves
    GenerateKeypair,
    /// Print the public key belonging to a private key
    Inspect {
        /// Hex-encoded private key
        #[arg(long)]
        private_key: String,
    },
    /// Build, sign and submit a transfer
    Send {
        /// Hex-encoded private key paying for the transfer
        #[arg(long)]
        private_key: String,
        /// Public key receiving the coins
        #[arg(long)]
        to: PublicKey,
        /// Amount, up to eight fractional digits (e.g. 1.5)
        #[arg(long)]
        coins: Coins,
        /// File whose bytes ride along as extra data
        #[arg(long)]
        extra_data_file: Option<PathBuf>,
        /// Node to submit to, as host or host:port
        #[arg(long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Options::parse().command {
        Command::GenerateKeypair => {
            let (private_key, public_key) = generate_keypair();
            println!("private key: {}", private_key);
            println!("public key:  {}", public_key);
        }
        Command::Inspect { private_key } => {
            let public_key = public_key_for(&private_key).context("invalid private key")?;
            println!("public key: {}", public_key);
        }
        Command::Send {
            private_key,
            to,
            coins,
            extra_data_file,
            node,
        } => {
            let from = public_key_for(&private_key).context("invalid private key")?;
            let extra_data = match extra_data_file {
                Some(path) => Some(
                    fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };

            let now = time::now();
            let hash = transaction_hash(Some(&from), &to, &coins, extra_data.as_deref(), &now);
            let signature = sign(&hash.to_hex(), &private_key)?;
            let transaction = UnconfirmedTransaction {
                hash,
                from_account: Some(from),
                to_account: to,
                coins,
                extra_data,
                time: now,
                signature,
            };
            println!(
                "transaction created and signed:\n{}",
                serde_json::to_string_pretty(&transaction)?
            );

            let base_url = normalize_node(&node);
            let response = reqwest::Client::new()
                .post(format!("{}/api/submit_transaction/", base_url))
                .json(&transaction)
                .send()
                .await
                .with_context(|| format!("submitting to {}", base_url))?;

            let status = response.status();
            if status.is_success() {
                println!("transaction submitted!");
            } else {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("node rejected the transaction ({}): {}", status, body));
            }
        }
    }
    Ok(())
}
