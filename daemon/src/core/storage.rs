use std::path::Path;

use log::{debug, trace, warn};
use sled::transaction::TransactionError;
use sled::Transactional;

use boocoin_common::api::BlockPayload;
use boocoin_common::block::Block;
use boocoin_common::config::CHAIN_WALK_LIMIT;
use boocoin_common::crypto::hash::{Hash, HASH_SIZE};
use boocoin_common::transaction::{Transaction, UnconfirmedTransaction};

use super::error::BlockchainError;

/// Read access to a chain of committed blocks. [`Storage`] implements it
/// over sled; [`PendingChain`] layers a not-yet-committed batch on top so a
/// pulled chain can be validated before anything lands.
pub trait ChainReader {
    fn block(&self, id: &Hash) -> Result<Option<Block>, BlockchainError>;

    fn genesis(&self) -> Result<Block, BlockchainError>;

    fn block_contains_transaction(
        &self,
        block_id: &Hash,
        tx_hash: &Hash,
    ) -> Result<bool, BlockchainError>;

    /// Whether `tx_hash` appears in `start` or any of its ancestors,
    /// visiting at most [`CHAIN_WALK_LIMIT`] blocks.
    fn has_transaction_in_chain(
        &self,
        start: &Hash,
        tx_hash: &Hash,
    ) -> Result<bool, BlockchainError> {
        let mut cursor = Some(start.clone());
        for _ in 0..CHAIN_WALK_LIMIT {
            let Some(id) = cursor else { break };
            if self.block_contains_transaction(&id, tx_hash)? {
                return Ok(true);
            }
            cursor = self.block(&id)?.and_then(|block| block.previous_block);
        }
        Ok(false)
    }
}

/// Persistent store for the chain. One sled tree per entity:
///
/// - `blocks`: block id -> block row
/// - `block_transactions`: block id -> ordered transaction hashes
/// - `transactions`: tx hash ++ block id -> transaction row, so a prefix
///   scan by hash yields every inclusion and `(hash, block)` is unique by
///   construction
/// - `chain_index`: inverted depth ++ id -> id; the first entry in key
///   order is always the active block, making fork choice a point read
/// - `unconfirmed`: tx hash -> pool row
/// - `sync_locks`: lock id -> node endpoint
///
/// Rows are serde_json. Nothing is cached: every read goes to the trees.
pub struct Storage {
    db: sled::Db,
    blocks: sled::Tree,
    block_transactions: sled::Tree,
    transactions: sled::Tree,
    chain_index: sled::Tree,
    unconfirmed: sled::Tree,
    sync_locks: sled::Tree,
}

struct PreparedBlock {
    id: Hash,
    block_row: Vec<u8>,
    list_row: Vec<u8>,
    index_key: Vec<u8>,
    tx_rows: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockchainError> {
        let db = sled::open(path)?;
        Ok(Self {
            blocks: db.open_tree("blocks")?,
            block_transactions: db.open_tree("block_transactions")?,
            transactions: db.open_tree("transactions")?,
            chain_index: db.open_tree("chain_index")?,
            unconfirmed: db.open_tree("unconfirmed")?,
            sync_locks: db.open_tree("sync_locks")?,
            db,
        })
    }

    // Inverting the depth puts the deepest blocks first; appending the id
    // breaks depth ties towards the lexicographically smallest hash.
    fn chain_index_key(depth: u64, id: &Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(8 + HASH_SIZE);
        key.extend_from_slice(&(u64::MAX - depth).to_be_bytes());
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn transaction_key(tx_hash: &Hash, block_id: &Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(HASH_SIZE * 2);
        key.extend_from_slice(tx_hash.as_bytes());
        key.extend_from_slice(block_id.as_bytes());
        key
    }

    fn decode_id(bytes: &[u8]) -> Result<Hash, BlockchainError> {
        let bytes: [u8; HASH_SIZE] =
            bytes.try_into().map_err(|_| BlockchainError::CorruptIndex)?;
        Ok(Hash::new(bytes))
    }

    pub fn has_block(&self, id: &Hash) -> Result<bool, BlockchainError> {
        Ok(self.blocks.contains_key(id.as_bytes())?)
    }

    pub fn has_blocks(&self) -> Result<bool, BlockchainError> {
        Ok(!self.blocks.is_empty())
    }

    pub fn get_block(&self, id: &Hash) -> Result<Option<Block>, BlockchainError> {
        trace!("get block {}", id);
        match self.blocks.get(id.as_bytes())? {
            Some(row) => Ok(Some(serde_json::from_slice(&row)?)),
            None => Ok(None),
        }
    }

    /// The unique block of depth 0.
    pub fn get_genesis(&self) -> Result<Block, BlockchainError> {
        // depth 0 sorts last in the inverted index
        let (_, id) = self
            .chain_index
            .last()?
            .ok_or(BlockchainError::MissingGenesis)?;
        let id = Self::decode_id(&id)?;
        self.get_block(&id)?
            .ok_or(BlockchainError::BlockNotFound(id))
    }

    /// Fork choice: the committed block with the greatest depth, ties broken
    /// by the smallest id. Re-read from the index on every call so the
    /// answer only ever depends on the committed set.
    pub fn get_active_block(&self) -> Result<Block, BlockchainError> {
        let (_, id) = self
            .chain_index
            .first()?
            .ok_or(BlockchainError::MissingGenesis)?;
        let id = Self::decode_id(&id)?;
        self.get_block(&id)?
            .ok_or(BlockchainError::BlockNotFound(id))
    }

    /// The block's transactions in block order.
    pub fn get_block_transactions(
        &self,
        id: &Hash,
    ) -> Result<Vec<Transaction>, BlockchainError> {
        let Some(row) = self.block_transactions.get(id.as_bytes())? else {
            return Ok(Vec::new());
        };
        let hashes: Vec<Hash> = serde_json::from_slice(&row)?;
        let mut transactions = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let row = self
                .transactions
                .get(Self::transaction_key(&hash, id))?
                .ok_or(BlockchainError::TransactionNotFound(hash))?;
            transactions.push(serde_json::from_slice(&row)?);
        }
        Ok(transactions)
    }

    pub fn get_block_payload(
        &self,
        id: &Hash,
    ) -> Result<Option<BlockPayload>, BlockchainError> {
        let Some(block) = self.get_block(id)? else {
            return Ok(None);
        };
        let transactions = self.get_block_transactions(id)?;
        Ok(Some(BlockPayload {
            block,
            transactions,
        }))
    }

    /// Every committed transaction carrying this hash; more than one row
    /// means sibling forks both included it.
    pub fn get_transactions_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Vec<Transaction>, BlockchainError> {
        let mut rows = Vec::new();
        for item in self.transactions.scan_prefix(hash.as_bytes()) {
            let (_, row) = item?;
            rows.push(serde_json::from_slice(&row)?);
        }
        Ok(rows)
    }

    /// Commits one block and its transactions atomically. Re-committing a
    /// known id is a no-op.
    pub fn commit_block(
        &self,
        block: Block,
        transactions: Vec<Transaction>,
        drop_unconfirmed: &[Hash],
    ) -> Result<(), BlockchainError> {
        self.commit_batch(vec![(block, transactions)], drop_unconfirmed)
    }

    /// Commits a run of blocks in one storage transaction: every row lands
    /// or none do. Blocks already present are skipped; the listed
    /// unconfirmed hashes are removed in the same transaction.
    pub fn commit_batch(
        &self,
        batch: Vec<(Block, Vec<Transaction>)>,
        drop_unconfirmed: &[Hash],
    ) -> Result<(), BlockchainError> {
        let mut prepared = Vec::with_capacity(batch.len());
        for (block, transactions) in &batch {
            if self.has_block(&block.id)? {
                debug!("block {} is already committed", block.id);
                continue;
            }
            let hashes: Vec<&Hash> = transactions.iter().map(|t| &t.hash).collect();
            let tx_rows = transactions
                .iter()
                .map(|t| {
                    Ok((
                        Self::transaction_key(&t.hash, &block.id),
                        serde_json::to_vec(t)?,
                    ))
                })
                .collect::<Result<Vec<_>, serde_json::Error>>()?;
            prepared.push(PreparedBlock {
                id: block.id.clone(),
                block_row: serde_json::to_vec(block)?,
                list_row: serde_json::to_vec(&hashes)?,
                index_key: Self::chain_index_key(block.depth, &block.id),
                tx_rows,
            });
        }
        if prepared.is_empty() && drop_unconfirmed.is_empty() {
            return Ok(());
        }

        let trees = (
            &self.blocks,
            &self.block_transactions,
            &self.transactions,
            &self.chain_index,
            &self.unconfirmed,
        );
        let result: Result<(), TransactionError<()>> = trees.transaction(
            |(blocks, block_transactions, transactions, chain_index, unconfirmed)| {
                for block in &prepared {
                    let id = block.id.as_bytes().as_slice();
                    blocks.insert(id, block.block_row.as_slice())?;
                    block_transactions.insert(id, block.list_row.as_slice())?;
                    for (key, row) in &block.tx_rows {
                        transactions.insert(key.as_slice(), row.as_slice())?;
                    }
                    chain_index.insert(block.index_key.as_slice(), id)?;
                }
                for hash in drop_unconfirmed {
                    unconfirmed.remove(hash.as_bytes().as_slice())?;
                }
                Ok(())
            },
        );
        result.map_err(|error| match error {
            TransactionError::Storage(error) => BlockchainError::Storage(error),
            // the closure never aborts
            TransactionError::Abort(()) => BlockchainError::Storage(sled::Error::Unsupported(
                "storage transaction aborted".to_string(),
            )),
        })?;
        for block in &prepared {
            debug!("committed block {}", block.id);
        }
        Ok(())
    }

    pub fn count_unconfirmed(&self) -> usize {
        self.unconfirmed.len()
    }

    /// Pools a transaction, keyed by hash. Returns false when it was
    /// already pooled.
    pub fn insert_unconfirmed(
        &self,
        transaction: &UnconfirmedTransaction,
    ) -> Result<bool, BlockchainError> {
        let row = serde_json::to_vec(transaction)?;
        Ok(self
            .unconfirmed
            .insert(transaction.hash.as_bytes(), row)?
            .is_none())
    }

    /// The whole pool in hash order, which is the stable order mining
    /// prunes in.
    pub fn all_unconfirmed(&self) -> Result<Vec<UnconfirmedTransaction>, BlockchainError> {
        let mut pool = Vec::new();
        for row in self.unconfirmed.iter().values() {
            pool.push(serde_json::from_slice(&row?)?);
        }
        Ok(pool)
    }

    pub fn unconfirmed_hashes(&self) -> Result<Vec<Hash>, BlockchainError> {
        let mut hashes = Vec::new();
        for key in self.unconfirmed.iter().keys() {
            hashes.push(Self::decode_id(&key?)?);
        }
        Ok(hashes)
    }

    pub fn delete_unconfirmed(&self, hashes: &[Hash]) -> Result<(), BlockchainError> {
        for hash in hashes {
            self.unconfirmed.remove(hash.as_bytes())?;
        }
        Ok(())
    }

    pub fn delete_all_unconfirmed(&self) -> Result<(), BlockchainError> {
        self.unconfirmed.clear()?;
        Ok(())
    }

    pub fn sync_locks_count(&self) -> usize {
        self.sync_locks.len()
    }

    /// Drops every lock row. Run at startup: locks left behind by a crash
    /// would suppress mining forever.
    pub fn clear_sync_locks(&self) -> Result<(), BlockchainError> {
        self.sync_locks.clear()?;
        Ok(())
    }

    /// Takes a lock row for the duration of an outbound sync. The returned
    /// guard removes the row when dropped, whatever the exit path.
    pub fn acquire_sync_lock(&self, node: &str) -> Result<SyncLockGuard, BlockchainError> {
        let id = self.db.generate_id()?;
        let key = id.to_be_bytes();
        self.sync_locks.insert(key, node.as_bytes())?;
        trace!("sync lock {} acquired for {}", id, node);
        Ok(SyncLockGuard {
            tree: self.sync_locks.clone(),
            key,
        })
    }
}

impl ChainReader for Storage {
    fn block(&self, id: &Hash) -> Result<Option<Block>, BlockchainError> {
        self.get_block(id)
    }

    fn genesis(&self) -> Result<Block, BlockchainError> {
        self.get_genesis()
    }

    fn block_contains_transaction(
        &self,
        block_id: &Hash,
        tx_hash: &Hash,
    ) -> Result<bool, BlockchainError> {
        Ok(self
            .transactions
            .contains_key(Self::transaction_key(tx_hash, block_id))?)
    }
}

/// Holds a sync-lock row; dropping it releases the row.
pub struct SyncLockGuard {
    tree: sled::Tree,
    key: [u8; 8],
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        if let Err(error) = self.tree.remove(self.key) {
            warn!("failed to release sync lock: {}", error);
        }
    }
}

/// A batch of validated-but-uncommitted blocks layered over the store.
/// Sync validates each pulled block against this view before the batch is
/// committed in one transaction.
pub struct PendingChain<'a> {
    storage: &'a Storage,
    pending: Vec<(Block, Vec<Transaction>)>,
}

impl<'a> PendingChain<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, block: Block, transactions: Vec<Transaction>) {
        self.pending.push((block, transactions));
    }

    pub fn into_pending(self) -> Vec<(Block, Vec<Transaction>)> {
        self.pending
    }
}

impl ChainReader for PendingChain<'_> {
    fn block(&self, id: &Hash) -> Result<Option<Block>, BlockchainError> {
        for (block, _) in &self.pending {
            if block.id == *id {
                return Ok(Some(block.clone()));
            }
        }
        self.storage.get_block(id)
    }

    fn genesis(&self) -> Result<Block, BlockchainError> {
        self.storage.get_genesis()
    }

    fn block_contains_transaction(
        &self,
        block_id: &Hash,
        tx_hash: &Hash,
    ) -> Result<bool, BlockchainError> {
        for (block, transactions) in &self.pending {
            if block.id == *block_id {
                return Ok(transactions.iter().any(|t| t.hash == *tx_hash));
            }
        }
        self.storage.block_contains_transaction(block_id, tx_hash)
    }
}
