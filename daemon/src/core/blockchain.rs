use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::RwLock;

use boocoin_common::api::BlockPayload;
use boocoin_common::config::MINE_TRANSACTION_THRESHOLD;
use boocoin_common::crypto::hash::Hash;
use boocoin_common::transaction::UnconfirmedTransaction;

use super::error::BlockchainError;
use super::mining;
use super::storage::Storage;
use super::validation;
use crate::config::NodeConfig;
use crate::p2p;

/// The node's view of the chain: the store plus the injected configuration.
///
/// The lock serializes block writers — mining, sync batches and inbound
/// peer blocks all take it for writing, so no two blocks are ever appended
/// concurrently. Readers share it freely; nothing is cached outside the
/// store.
pub struct Blockchain {
    storage: RwLock<Storage>,
    config: Arc<NodeConfig>,
}

/// What happened to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Pooled; the submission should be gossiped to peers.
    Pooled,
    /// Pooling it crossed the threshold and a block was mined.
    Mined,
}

/// What happened to a block handed to us by a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockIngest {
    Committed,
    AlreadyKnown,
    /// The parent is missing locally; the caller should sync with the
    /// sender instead.
    UnknownParent(Hash),
}

impl Blockchain {
    pub fn new(storage: Storage, config: Arc<NodeConfig>) -> Arc<Self> {
        Arc::new(Self {
            storage: RwLock::new(storage),
            config,
        })
    }

    pub fn config(&self) -> &Arc<NodeConfig> {
        &self.config
    }

    pub fn storage(&self) -> &RwLock<Storage> {
        &self.storage
    }

    /// Validates a transaction against the active block, pools it, and
    /// mines when the pool reaches the threshold. Re-submitting a pooled
    /// transaction is a no-op.
    pub async fn submit_transaction(
        &self,
        transaction: UnconfirmedTransaction,
    ) -> Result<SubmitOutcome, BlockchainError> {
        let due = {
            let storage = self.storage.write().await;
            let active_block = storage.get_active_block()?;
            validation::validate_unconfirmed(&*storage, &active_block, &transaction)?;
            if !storage.insert_unconfirmed(&transaction)? {
                debug!("transaction {} is already pooled", transaction.hash);
            }
            storage.count_unconfirmed() >= MINE_TRANSACTION_THRESHOLD
        };

        if due {
            info!(
                "at least {} transactions waiting, mining new block",
                MINE_TRANSACTION_THRESHOLD
            );
            self.mine_block().await?;
            Ok(SubmitOutcome::Mined)
        } else {
            Ok(SubmitOutcome::Pooled)
        }
    }

    /// Runs one mining attempt and broadcasts the result. Serialized with
    /// every other block writer by the storage lock; suppressed while any
    /// sync lock exists.
    pub async fn mine_block(&self) -> Result<(), BlockchainError> {
        let mined = {
            let storage = self.storage.write().await;
            mining::mine_block(&storage, &self.config)?
        };
        if let Some(payload) = mined {
            let config = self.config.clone();
            tokio::spawn(async move {
                p2p::broadcast_block(&config, &payload).await;
            });
        }
        Ok(())
    }

    /// Handles a block transmitted by a peer: idempotent for known blocks,
    /// defers to sync when the parent is missing, otherwise validates and
    /// commits.
    pub async fn receive_block(
        &self,
        payload: BlockPayload,
    ) -> Result<BlockIngest, BlockchainError> {
        let (block, transactions) = validation::parse_payload(payload)?;
        let storage = self.storage.write().await;

        if storage.has_block(&block.id)? {
            debug!("block {} is already known", block.id);
            return Ok(BlockIngest::AlreadyKnown);
        }

        if let Some(previous) = &block.previous_block {
            if !storage.has_block(previous)? {
                return Ok(BlockIngest::UnknownParent(previous.clone()));
            }
        }

        validation::validate_block(&*storage, &block, &transactions)?;
        let id = block.id.clone();
        let depth = block.depth;
        storage.commit_block(block, transactions, &[])?;
        info!("committed block {} at depth {}", id, depth);
        Ok(BlockIngest::Committed)
    }

    /// Whether the scheduler should trigger a mine attempt.
    pub async fn is_due(&self) -> Result<bool, BlockchainError> {
        let storage = self.storage.read().await;
        mining::is_time_to_mine(&storage)
    }
}

/// Imports a genesis file into an empty store. Fatal when the file is
/// missing or its block does not validate.
pub fn import_genesis(storage: &Storage, path: &Path) -> Result<(), BlockchainError> {
    info!("importing genesis block from {}", path.display());
    let raw = std::fs::read(path).map_err(|error| {
        BlockchainError::Config(format!(
            "cannot read genesis file {}: {}",
            path.display(),
            error
        ))
    })?;
    let payload: BlockPayload = serde_json::from_slice(&raw)
        .map_err(|error| BlockchainError::Config(format!("malformed genesis file: {}", error)))?;
    let (block, transactions) = validation::parse_payload(payload)?;
    validation::validate_genesis(&block, &transactions)?;
    let id = block.id.clone();
    storage.commit_block(block, transactions, &[])?;
    info!("genesis block {} imported", id);
    Ok(())
}
