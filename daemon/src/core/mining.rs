use log::{debug, info, warn};

use boocoin_common::api::BlockPayload;
use boocoin_common::balances::{apply_transactions, Balances};
use boocoin_common::block::Block;
use boocoin_common::config::{BLOCK_INTERVAL_SECS, MINE_TRANSACTION_THRESHOLD};
use boocoin_common::time;
use boocoin_common::transaction::{create_block_reward, Transaction, UnconfirmedTransaction};

use super::error::BlockchainError;
use super::storage::{ChainReader, Storage};
use super::validation::{self, InvalidTransaction};
use crate::config::NodeConfig;

/// Whether the pool or the clock warrants a new block: ten transactions
/// waiting, or ten minutes since the active block.
pub fn is_time_to_mine(storage: &Storage) -> Result<bool, BlockchainError> {
    let active_block = storage.get_active_block()?;
    let elapsed = time::now().signed_duration_since(active_block.time);
    Ok(storage.count_unconfirmed() >= MINE_TRANSACTION_THRESHOLD
        || elapsed >= chrono::Duration::seconds(BLOCK_INTERVAL_SECS))
}

/// Walks the pool in its stable order, validating each entry against a
/// running balances map that starts from the active block. Entries that
/// fail are deleted; survivors are returned in order.
///
/// Every entry is validated as a regular transfer: user submissions are
/// never rewards, and the reward is prepended only after pruning.
fn prune_invalid_transactions(
    storage: &Storage,
    active_block: &Block,
    pool: Vec<UnconfirmedTransaction>,
) -> Result<Vec<UnconfirmedTransaction>, BlockchainError> {
    debug!("pruning invalid transactions...");
    let mut approved = Vec::with_capacity(pool.len());
    let mut balances = active_block.balances.clone();

    for transaction in pool {
        let verdict = if storage.has_transaction_in_chain(&active_block.id, &transaction.hash)? {
            Err(InvalidTransaction::ReplayedInChain)
        } else {
            validation::validate_transaction(&balances, &transaction, false)
        };
        match verdict {
            Ok(updated) => {
                // Transaction passed; carry the updated balances forward so
                // later entries cannot double-spend the same funds
                balances = updated;
                approved.push(transaction);
            }
            Err(reason) => {
                debug!("transaction {} invalid, pruning: {}", transaction.hash, reason);
                storage.delete_unconfirmed(std::slice::from_ref(&transaction.hash))?;
            }
        }
    }

    Ok(approved)
}

/// Assembles, validates and commits a new block on top of the active one.
///
/// Aborts silently while any sync lock exists: mining must not race an
/// incoming chain. Returns the committed payload for broadcast, or None
/// when the attempt was suppressed or failed its own validation.
pub fn mine_block(
    storage: &Storage,
    config: &NodeConfig,
) -> Result<Option<BlockPayload>, BlockchainError> {
    debug!("checking for sync locks...");
    if storage.sync_locks_count() > 0 {
        debug!("looks like we're syncing, canceling the mine attempt");
        return Ok(None);
    }

    debug!("mining new block...");
    let active_block = storage.get_active_block()?;
    debug!("{} is the active block", active_block.id);

    let pool = storage.all_unconfirmed()?;
    debug!("{} unconfirmed transactions found", pool.len());

    let approved = prune_invalid_transactions(storage, &active_block, pool)?;
    debug!("{} transactions after pruning", approved.len());

    // The block reward leads; the pruned survivors follow in order
    let mut transactions = Vec::with_capacity(approved.len() + 1);
    transactions.push(create_block_reward(&config.wallet_public_key));
    transactions.extend(approved);

    let balances: Balances = apply_transactions(active_block.balances.clone(), &transactions)
        .map_err(|error| BlockchainError::InvalidTransaction(error.into()))?;

    let block = Block::assemble(
        Some(active_block.id.clone()),
        active_block.depth + 1,
        config.miner_public_key.clone(),
        balances,
        &transactions,
        config.block_extra_data.clone(),
        time::now(),
        &config.miner_private_key,
    )?;

    // Validate our own work before committing it
    if let Err(error) = validation::validate_block(storage, &block, &transactions) {
        warn!("failed to mine block - validation error: {}", error);
        return Ok(None);
    }

    let rows: Vec<Transaction> = transactions
        .into_iter()
        .map(|t| t.into_transaction(block.id.clone()))
        .collect();
    let drop = storage.unconfirmed_hashes()?;
    let payload = BlockPayload {
        block: block.clone(),
        transactions: rows.clone(),
    };
    storage.commit_block(block, rows, &drop)?;
    info!("block {} successfully mined", payload.block.id);

    Ok(Some(payload))
}
