//! Genesis block generator.
//!
//! Builds the depth-0 block for a new network: a single block-reward
//! transaction, the authorized miner set embedded as JSON in `extra_data`,
//! and balances derived from an empty map. The result is written to a file
//! every node imports on first start.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use boocoin_common::api::BlockPayload;
use boocoin_common::balances::{apply_transactions, Balances};
use boocoin_common::block::Block;
use boocoin_common::crypto::keys::{public_key_for, PublicKey};
use boocoin_common::time;
use boocoin_common::transaction::create_block_reward;

#[derive(Debug, Parser)]
#[command(name = "boocoin_genesis", version, about = "Generates a genesis block")]
struct Options {
    /// Authorized miner public keys; the signing miner's key must be one
    /// of them
    #[arg(required = true)]
    miner_public_keys: Vec<PublicKey>,

    /// Private key of the miner signing the genesis block
    #[arg(long)]
    miner_private_key: String,

    /// Wallet credited with the genesis block reward
    #[arg(long)]
    wallet_public_key: PublicKey,

    /// Where to write the genesis block
    #[arg(long, default_value = "genesis.json")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let options = Options::parse();

    // This block will be signed by the miner, so its key must be included
    let miner_public_key =
        public_key_for(&options.miner_private_key).context("invalid miner private key")?;
    if !options.miner_public_keys.contains(&miner_public_key) {
        bail!("your public key must be included in the miner set");
    }

    let transactions = vec![create_block_reward(&options.wallet_public_key)];
    let balances = apply_transactions(Balances::new(), &transactions)?;
    let extra_data = serde_json::to_vec(&options.miner_public_keys)?;

    let block = Block::assemble(
        None,
        0,
        miner_public_key,
        balances,
        &transactions,
        Some(extra_data),
        time::now(),
        &options.miner_private_key,
    )?;

    let payload = BlockPayload {
        transactions: transactions
            .into_iter()
            .map(|t| t.into_transaction(block.id.clone()))
            .collect(),
        block,
    };
    fs::write(&options.output, serde_json::to_vec_pretty(&payload)?)
        .with_context(|| format!("writing {}", options.output.display()))?;

    println!(
        "genesis block {} saved to {}",
        payload.block.id,
        options.output.display()
    );
    Ok(())
}
