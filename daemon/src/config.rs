use std::path::PathBuf;

use clap::Parser;

use boocoin_common::config::{normalize_node, DEFAULT_BIND_ADDRESS};
use boocoin_common::crypto::keys::{self, PublicKey};

use crate::core::error::BlockchainError;

/// Command-line options for the daemon.
#[derive(Debug, Parser)]
#[command(name = "boocoin_daemon", version, about = "Boocoin node daemon")]
pub struct NodeOptions {
    /// Address the HTTP API binds to
    #[arg(long, default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: String,

    /// Peer node as host or host:port; repeat for each peer. Do not
    /// include this node's own endpoint.
    #[arg(long = "node")]
    pub nodes: Vec<String>,

    /// Hex-encoded private key used to sign mined blocks
    #[arg(long)]
    pub miner_private_key: String,

    /// Public key credited with the 100 coin block reward
    #[arg(long)]
    pub wallet_public_key: PublicKey,

    /// Extra bytes stamped into every block this node mines
    #[arg(long)]
    pub block_extra_data: Option<String>,

    /// Endpoint announced to peers when broadcasting blocks
    #[arg(long)]
    pub self_endpoint: String,

    /// Directory holding the block store
    #[arg(long, default_value = "boocoin-data")]
    pub data_dir: PathBuf,

    /// Genesis file imported when the store is empty
    #[arg(long, default_value = "genesis.json")]
    pub genesis_file: PathBuf,
}

/// Resolved configuration, injected into every component that needs it.
/// Peer endpoints are pre-normalized into base URLs; the miner public key
/// is derived from the private key so the two can never disagree.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub peers: Vec<String>,
    pub miner_public_key: PublicKey,
    pub miner_private_key: String,
    pub wallet_public_key: PublicKey,
    pub block_extra_data: Option<Vec<u8>>,
    pub self_endpoint: String,
    pub data_dir: PathBuf,
    pub genesis_file: PathBuf,
}

impl NodeOptions {
    pub fn resolve(self) -> Result<NodeConfig, BlockchainError> {
        let miner_public_key = keys::public_key_for(&self.miner_private_key).map_err(|_| {
            BlockchainError::Config("miner private key is not a valid key".to_string())
        })?;
        Ok(NodeConfig {
            bind_address: self.bind_address,
            peers: self.nodes.iter().map(|node| normalize_node(node)).collect(),
            miner_public_key,
            miner_private_key: self.miner_private_key,
            wallet_public_key: self.wallet_public_key,
            block_extra_data: self.block_extra_data.map(String::into_bytes),
            self_endpoint: self.self_endpoint,
            data_dir: self.data_dir,
            genesis_file: self.genesis_file,
        })
    }
}
