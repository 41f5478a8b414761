mod client;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use boocoin_common::api::{BlockPayload, TransmitBlockRequest};
use boocoin_common::config::BROADCAST_TIMEOUT_SECS;
use boocoin_common::crypto::hash::Hash;
use boocoin_common::transaction::UnconfirmedTransaction;

use crate::config::NodeConfig;
use crate::core::blockchain::Blockchain;
use crate::core::error::BlockchainError;
use crate::core::mining;
use crate::core::storage::PendingChain;
use crate::core::validation;

pub use client::{HttpPeer, PeerApi};

/// Broadcasts a transaction to all of the configured nodes. Fire and
/// forget: per-peer failures are logged and swallowed.
pub async fn broadcast_transaction(config: &NodeConfig, transaction: &UnconfirmedTransaction) {
    let client = reqwest::Client::new();
    for node in &config.peers {
        let result = client
            .post(format!("{}/p2p/transmit_transaction/", node))
            .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
            .json(transaction)
            .send()
            .await;
        if let Err(error) = result {
            warn!("{}", error);
            continue;
        }
    }
}

/// Broadcasts a freshly mined block to all of the configured nodes,
/// announcing our own endpoint as the sender identity.
pub async fn broadcast_block(config: &NodeConfig, payload: &BlockPayload) {
    let client = reqwest::Client::new();
    let request = TransmitBlockRequest {
        block: payload.clone(),
        node: config.self_endpoint.clone(),
    };
    for node in &config.peers {
        let result = client
            .post(format!("{}/p2p/transmit_block/", node))
            .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
            .json(&request)
            .send()
            .await;
        if let Err(error) = result {
            warn!("{}", error);
            continue;
        }
    }
}

/// Syncs this node with each configured node, one at a time; syncs never
/// run in parallel.
pub async fn sync_all(chain: &Arc<Blockchain>) {
    for node in chain.config().peers.clone() {
        sync(chain, &node).await;
    }
}

/// Wraps the chain walk in a store-visible sync lock so mining stays
/// suppressed until we are up to date. Once the last lock is released and
/// the node is due, a mine attempt follows immediately.
pub async fn sync(chain: &Arc<Blockchain>, node: &str) {
    {
        let lock = {
            let storage = chain.storage().read().await;
            storage.acquire_sync_lock(node)
        };
        let _lock = match lock {
            Ok(lock) => lock,
            Err(error) => {
                warn!("could not take a sync lock for {}: {}", node, error);
                return;
            }
        };

        info!("starting sync with {}...", node);
        match sync_with_peer(chain, &HttpPeer::new(node)).await {
            Ok(()) => info!("finished syncing with {}", node),
            Err(error) => {
                warn!("failed to sync with node {}!", node);
                warn!("{}", error);
            }
        }
        // the lock row is released here, whatever happened above
    }

    let due = {
        let storage = chain.storage().read().await;
        storage.sync_locks_count() == 0
            && match mining::is_time_to_mine(&storage) {
                Ok(due) => due,
                Err(error) => {
                    warn!("could not read the chain after sync: {}", error);
                    false
                }
            }
    };
    if due {
        info!("all syncs are completed and it's time to mine!");
        if let Err(error) = chain.mine_block().await {
            warn!("mining after sync failed: {}", error);
        }
    }
}

fn sync_error<P: PeerApi>(peer: &P, reason: impl Into<String>) -> BlockchainError {
    BlockchainError::Sync {
        node: peer.endpoint().to_string(),
        reason: reason.into(),
    }
}

/// Pull-based ancestry scan. Pages through the peer's history newest-first
/// until a locally known block turns up, pulls everything newer, commits it
/// oldest-first, then restarts from the top to double-check nothing new
/// arrived meanwhile.
pub async fn sync_with_peer<P: PeerApi>(
    chain: &Arc<Blockchain>,
    peer: &P,
) -> Result<(), BlockchainError> {
    'restart: loop {
        // ids accumulate across pages so a deep gap is committed in one go
        let mut history: Vec<Hash> = Vec::new();
        let mut before: Option<Hash> = None;
        loop {
            debug!(
                "getting blockchain history (before {:?})",
                before.as_ref().map(Hash::to_hex)
            );
            let page = peer.blockchain_history(before.as_ref()).await?;

            if before.is_none() {
                // Check if we're fully synced (we have the peer's active block)
                let latest = page
                    .first()
                    .ok_or_else(|| sync_error(peer, "peer returned an empty history"))?;
                let storage = chain.storage().read().await;
                if storage.has_block(latest)? {
                    debug!("we are fully synced");
                    return Ok(());
                }
            } else if page.is_empty() {
                // walked past the peer's genesis without finding overlap
                return Err(sync_error(peer, "no common block with peer"));
            }

            debug!("searching for common block...");
            let already_scanned = history.len();
            history.extend(page);
            let overlap = {
                let storage = chain.storage().read().await;
                let mut found = None;
                for (idx, id) in history.iter().enumerate().skip(already_scanned) {
                    if storage.has_block(id)? {
                        found = Some(idx);
                        break;
                    }
                }
                found
            };

            match overlap {
                Some(idx) => {
                    debug!("found common block {}", history[idx]);
                    // Everything listed before the common block is the
                    // peer's newer chain; they arrive newest-first, so
                    // reverse into chain order.
                    let mut wanted = history;
                    wanted.truncate(idx);
                    wanted.reverse();
                    sync_blocks(chain, peer, wanted).await?;
                    debug!("double checking we are synced...");
                    continue 'restart;
                }
                None => {
                    debug!("no common blocks found, going deeper...");
                    before = history.last().cloned();
                }
            }
        }
    }
}

/// Pulls full bodies for `ids` (oldest first), validates each against the
/// store plus the blocks before it in the batch, and commits the whole run
/// in one storage transaction. Pool entries confirmed by the batch are
/// dropped in the same transaction.
async fn sync_blocks<P: PeerApi>(
    chain: &Arc<Blockchain>,
    peer: &P,
    ids: Vec<Hash>,
) -> Result<(), BlockchainError> {
    debug!("downloading block data for {} blocks...", ids.len());
    let mut bodies = peer.blocks(&ids).await?;

    let storage = chain.storage().write().await;
    debug!("processing block data...");
    let mut view = PendingChain::new(&storage);
    for id in &ids {
        debug!("processing block {}...", id);
        let payload = bodies
            .remove(id)
            .ok_or_else(|| sync_error(peer, format!("peer did not return block {}", id)))?;
        let (block, transactions) = validation::parse_payload(payload)?;
        if block.id != *id {
            return Err(sync_error(peer, "peer returned a mismatched block"));
        }
        validation::validate_block(&view, &block, &transactions)?;
        view.push(block, transactions);
    }

    let batch = view.into_pending();
    let confirmed: Vec<Hash> = batch
        .iter()
        .flat_map(|(_, transactions)| transactions.iter().map(|t| t.hash.clone()))
        .collect();
    storage.commit_batch(batch, &confirmed)?;
    Ok(())
}
