use thiserror::Error;

use boocoin_common::block::BlockError;
use boocoin_common::crypto::hash::Hash;

use super::validation::{InvalidBlock, InvalidTransaction};

/// Errors surfaced by the daemon core. Validation failures carry the rule
/// that rejected the input; everything else is fatal to the operation that
/// hit it.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] InvalidTransaction),
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] InvalidBlock),
    #[error("block {0} not found")]
    BlockNotFound(Hash),
    #[error("transaction {0} not found")]
    TransactionNotFound(Hash),
    #[error("the store has no genesis block")]
    MissingGenesis,
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("corrupt chain index entry")]
    CorruptIndex,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("block assembly failed: {0}")]
    Assembly(#[from] BlockError),
    #[error("peer request failed: {0}")]
    Peer(#[from] reqwest::Error),
    #[error("sync with {node} failed: {reason}")]
    Sync { node: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
}
