use std::collections::HashSet;

use log::{debug, trace};
use thiserror::Error;

use boocoin_common::api::BlockPayload;
use boocoin_common::balances::{apply_transaction, BalanceError, Balances};
use boocoin_common::block::Block;
use boocoin_common::coins::Coins;
use boocoin_common::config::{
    BLOCK_INTERVAL_SECS, BLOCK_REWARD, BLOCK_REWARD_SIGNATURE, BLOCK_TRANSACTION_MINIMUM,
};
use boocoin_common::crypto::hash::Hash;
use boocoin_common::crypto::keys;
use boocoin_common::time;
use boocoin_common::transaction::{Transaction, TransactionData, UnconfirmedTransaction};

use super::error::BlockchainError;
use super::storage::ChainReader;

/// Why a transaction was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum InvalidTransaction {
    #[error("hash does not match transaction contents")]
    HashMismatch,
    #[error("time is in the future")]
    FutureTime,
    #[error("block reward must not have a sender")]
    RewardWithSender,
    #[error("block reward amount {0} is wrong")]
    RewardWrongAmount(Coins),
    #[error("block reward signature is invalid")]
    RewardBadSignature,
    #[error("missing sender account")]
    MissingSender,
    #[error("sender must not equal receiver")]
    SelfTransfer,
    #[error("bad signature")]
    BadSignature,
    #[error("coins must be positive")]
    NonPositiveCoins,
    #[error("{0}")]
    Balance(#[from] BalanceError),
    #[error("hash already exists in this chain")]
    ReplayedInChain,
}

/// Why a block was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum InvalidBlock {
    #[error("id does not match block contents")]
    HashMismatch,
    #[error("missing previous block reference")]
    MissingParent,
    #[error("previous block {0} does not exist")]
    UnknownParent(Hash),
    #[error("depth must be one greater than the parent's")]
    WrongDepth,
    #[error("time is in the future")]
    FutureTime,
    #[error("transaction count and minutes passed are both too low")]
    TooEarly,
    #[error("miner is not authorized by the genesis block")]
    UnauthorizedMiner,
    #[error("genesis block carries no miner list")]
    MalformedMinerList,
    #[error("bad miner signature")]
    BadSignature,
    #[error("merkle root does not match the transactions")]
    MerkleMismatch,
    #[error("block carries no transactions")]
    Empty,
    #[error("transaction {hash} rejected: {reason}")]
    Transaction {
        hash: Hash,
        reason: InvalidTransaction,
    },
    #[error("transaction {0} appears twice in the block")]
    DuplicateTransaction(Hash),
    #[error("transaction bound to a different block")]
    ForeignTransaction,
    #[error("balances do not match the applied transactions")]
    BalancesMismatch,
    #[error("not a genesis block")]
    NotGenesis,
}

fn tinvalid(reason: InvalidTransaction) -> InvalidTransaction {
    debug!("transaction is invalid: {}", reason);
    reason
}

fn binvalid(reason: InvalidBlock) -> BlockchainError {
    debug!("block is invalid: {}", reason);
    BlockchainError::InvalidBlock(reason)
}

/// Validates one transaction against a balances snapshot and returns the
/// snapshot with the transaction applied, so callers fold the result
/// forward instead of applying twice.
///
/// `first_in_block` marks the block-reward position: no sender, exactly the
/// reward amount, and the sentinel signature (the reward is authenticated
/// by the block signature, not its own).
pub fn validate_transaction<T: TransactionData>(
    balances: &Balances,
    transaction: &T,
    first_in_block: bool,
) -> Result<Balances, InvalidTransaction> {
    trace!("validating transaction {}", transaction.hash());

    if *transaction.hash() != transaction.calculate_hash() {
        return Err(tinvalid(InvalidTransaction::HashMismatch));
    }

    if transaction.time() > time::now() {
        return Err(tinvalid(InvalidTransaction::FutureTime));
    }

    if first_in_block {
        // This transaction should be a block reward
        if transaction.from_account().is_some() {
            return Err(tinvalid(InvalidTransaction::RewardWithSender));
        }
        if transaction.coins() != BLOCK_REWARD {
            return Err(tinvalid(InvalidTransaction::RewardWrongAmount(
                transaction.coins(),
            )));
        }
        if transaction.signature() != BLOCK_REWARD_SIGNATURE {
            return Err(tinvalid(InvalidTransaction::RewardBadSignature));
        }
    } else {
        let Some(from) = transaction.from_account() else {
            return Err(tinvalid(InvalidTransaction::MissingSender));
        };
        if from == transaction.to_account() {
            return Err(tinvalid(InvalidTransaction::SelfTransfer));
        }
        if !keys::verify(
            &transaction.hash().to_hex(),
            from,
            transaction.signature(),
        ) {
            return Err(tinvalid(InvalidTransaction::BadSignature));
        }
    }

    if transaction.coins().is_zero() {
        return Err(tinvalid(InvalidTransaction::NonPositiveCoins));
    }

    match apply_transaction(balances.clone(), transaction) {
        Ok(updated) => Ok(updated),
        Err(error) => Err(tinvalid(error.into())),
    }
}

/// Full validation of a pool submission: the stateless transaction rules
/// plus a replay check against the active chain, with balances taken from
/// the active block.
pub fn validate_unconfirmed<R: ChainReader>(
    reader: &R,
    active: &Block,
    transaction: &UnconfirmedTransaction,
) -> Result<(), BlockchainError> {
    if reader.has_transaction_in_chain(&active.id, &transaction.hash)? {
        return Err(tinvalid(InvalidTransaction::ReplayedInChain).into());
    }
    validate_transaction(&active.balances, transaction, false)?;
    Ok(())
}

/// Validates a non-genesis block and its transactions against the chain
/// visible through `reader`.
pub fn validate_block<R: ChainReader, T: TransactionData>(
    reader: &R,
    block: &Block,
    transactions: &[T],
) -> Result<(), BlockchainError> {
    debug!("validating block {}", block.id);

    // Verify the block hash
    if block.id != block.calculate_hash() {
        return Err(binvalid(InvalidBlock::HashMismatch));
    }

    // Get the previous block
    let Some(previous_id) = &block.previous_block else {
        return Err(binvalid(InvalidBlock::MissingParent));
    };
    let Some(previous_block) = reader.block(previous_id)? else {
        return Err(binvalid(InvalidBlock::UnknownParent(previous_id.clone())));
    };

    // Verify the depth of the block
    if block.depth != previous_block.depth + 1 {
        return Err(binvalid(InvalidBlock::WrongDepth));
    }

    // Ensure the block isn't in the future
    if block.time > time::now() {
        return Err(binvalid(InvalidBlock::FutureTime));
    }

    // The block needs 11 transactions (10 + the reward) or 10 minutes
    // passed since its parent
    let elapsed = block.time.signed_duration_since(previous_block.time);
    if transactions.len() < BLOCK_TRANSACTION_MINIMUM
        && elapsed < chrono::Duration::seconds(BLOCK_INTERVAL_SECS)
    {
        return Err(binvalid(InvalidBlock::TooEarly));
    }

    // The miner must be in the genesis block
    let genesis = reader.genesis()?;
    let Some(miners) = genesis.miner_set() else {
        return Err(binvalid(InvalidBlock::MalformedMinerList));
    };
    if !miners.contains(&block.miner) {
        return Err(binvalid(InvalidBlock::UnauthorizedMiner));
    }

    // Verify the miner's signature
    if !block.verify_signature() {
        return Err(binvalid(InvalidBlock::BadSignature));
    }

    // Verify merkle root
    let Ok(expected_merkle_root) = Block::merkle_root_of(transactions) else {
        return Err(binvalid(InvalidBlock::Empty));
    };
    if expected_merkle_root != block.merkle_root {
        return Err(binvalid(InvalidBlock::MerkleMismatch));
    }

    // Replay the transactions from the parent's balances; index 0 is the
    // reward. The resulting map must equal the stored snapshot exactly.
    let mut seen = HashSet::with_capacity(transactions.len());
    let mut balances = previous_block.balances.clone();
    for (idx, transaction) in transactions.iter().enumerate() {
        let hash = transaction.hash();
        if !seen.insert(hash.clone()) {
            return Err(binvalid(InvalidBlock::DuplicateTransaction(hash.clone())));
        }
        // A non-reward hash that already exists upstream is a replay
        if idx != 0 && reader.has_transaction_in_chain(&previous_block.id, hash)? {
            return Err(binvalid(InvalidBlock::Transaction {
                hash: hash.clone(),
                reason: InvalidTransaction::ReplayedInChain,
            }));
        }
        balances = validate_transaction(&balances, transaction, idx == 0).map_err(|reason| {
            binvalid(InvalidBlock::Transaction {
                hash: hash.clone(),
                reason,
            })
        })?;
    }
    if balances != block.balances {
        return Err(binvalid(InvalidBlock::BalancesMismatch));
    }

    debug!("block validated");
    Ok(())
}

/// Validates an imported genesis block: depth 0, no parent, a single-reward
/// style transaction list applied to an empty balances map, and a miner
/// drawn from its own embedded miner set.
pub fn validate_genesis(
    block: &Block,
    transactions: &[Transaction],
) -> Result<(), BlockchainError> {
    debug!("validating genesis block {}", block.id);

    if block.depth != 0 || block.previous_block.is_some() {
        return Err(binvalid(InvalidBlock::NotGenesis));
    }

    if block.id != block.calculate_hash() {
        return Err(binvalid(InvalidBlock::HashMismatch));
    }

    if block.time > time::now() {
        return Err(binvalid(InvalidBlock::FutureTime));
    }

    let Some(miners) = block.miner_set() else {
        return Err(binvalid(InvalidBlock::MalformedMinerList));
    };
    if !miners.contains(&block.miner) {
        return Err(binvalid(InvalidBlock::UnauthorizedMiner));
    }

    if !block.verify_signature() {
        return Err(binvalid(InvalidBlock::BadSignature));
    }

    let Ok(expected_merkle_root) = Block::merkle_root_of(transactions) else {
        return Err(binvalid(InvalidBlock::Empty));
    };
    if expected_merkle_root != block.merkle_root {
        return Err(binvalid(InvalidBlock::MerkleMismatch));
    }

    let mut balances = Balances::new();
    for (idx, transaction) in transactions.iter().enumerate() {
        balances = validate_transaction(&balances, transaction, idx == 0).map_err(|reason| {
            binvalid(InvalidBlock::Transaction {
                hash: transaction.hash.clone(),
                reason,
            })
        })?;
    }
    if balances != block.balances {
        return Err(binvalid(InvalidBlock::BalancesMismatch));
    }

    Ok(())
}

/// Splits a wire payload into its block and transaction rows, rejecting
/// transactions that claim a different block.
pub fn parse_payload(
    payload: BlockPayload,
) -> Result<(Block, Vec<Transaction>), BlockchainError> {
    let BlockPayload {
        block,
        transactions,
    } = payload;
    for transaction in &transactions {
        if transaction.block != block.id {
            return Err(binvalid(InvalidBlock::ForeignTransaction));
        }
    }
    Ok((block, transactions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boocoin_common::crypto::keys::{generate_keypair, sign, PublicKey};
    use boocoin_common::transaction::{create_block_reward, transaction_hash};

    fn transfer(
        from_key: &str,
        from: &PublicKey,
        to: &PublicKey,
        coins: &str,
    ) -> UnconfirmedTransaction {
        let coins: Coins = coins.parse().unwrap();
        let now = time::now();
        let hash = transaction_hash(Some(from), to, &coins, None, &now);
        let signature = sign(&hash.to_hex(), from_key).unwrap();
        UnconfirmedTransaction {
            hash,
            from_account: Some(from.clone()),
            to_account: to.clone(),
            coins,
            extra_data: None,
            time: now,
            signature,
        }
    }

    fn funded(account: &PublicKey, coins: &str) -> Balances {
        let mut balances = Balances::new();
        balances.insert(account.clone(), coins.parse().unwrap());
        balances
    }

    #[test]
    fn test_valid_transfer_updates_balances() {
        let (alice_key, alice) = generate_keypair();
        let (_, bob) = generate_keypair();
        let tx = transfer(&alice_key, &alice, &bob, "10");
        let updated = validate_transaction(&funded(&alice, "100"), &tx, false).unwrap();
        assert_eq!(updated[&alice].to_string(), "90.00000000");
        assert_eq!(updated[&bob].to_string(), "10.00000000");
    }

    #[test]
    fn test_rejects_hash_mismatch() {
        let (alice_key, alice) = generate_keypair();
        let (_, bob) = generate_keypair();
        let mut tx = transfer(&alice_key, &alice, &bob, "10");
        tx.coins = "11".parse().unwrap();
        assert_eq!(
            validate_transaction(&funded(&alice, "100"), &tx, false),
            Err(InvalidTransaction::HashMismatch)
        );
    }

    #[test]
    fn test_rejects_future_time() {
        let (alice_key, alice) = generate_keypair();
        let (_, bob) = generate_keypair();
        let mut tx = transfer(&alice_key, &alice, &bob, "10");
        tx.time += chrono::Duration::minutes(5);
        tx.hash = tx.calculate_hash();
        tx.signature = sign(&tx.hash.to_hex(), &alice_key).unwrap();
        assert_eq!(
            validate_transaction(&funded(&alice, "100"), &tx, false),
            Err(InvalidTransaction::FutureTime)
        );
    }

    #[test]
    fn test_rejects_missing_sender() {
        let (_, wallet) = generate_keypair();
        let reward = create_block_reward(&wallet);
        assert_eq!(
            validate_transaction(&Balances::new(), &reward, false),
            Err(InvalidTransaction::MissingSender)
        );
    }

    #[test]
    fn test_rejects_self_transfer() {
        let (alice_key, alice) = generate_keypair();
        let tx = transfer(&alice_key, &alice, &alice, "10");
        assert_eq!(
            validate_transaction(&funded(&alice, "100"), &tx, false),
            Err(InvalidTransaction::SelfTransfer)
        );
    }

    #[test]
    fn test_rejects_forged_signature() {
        let (_, alice) = generate_keypair();
        let (mallory_key, _) = generate_keypair();
        let (_, bob) = generate_keypair();
        let tx = transfer(&mallory_key, &alice, &bob, "10");
        assert_eq!(
            validate_transaction(&funded(&alice, "100"), &tx, false),
            Err(InvalidTransaction::BadSignature)
        );
    }

    #[test]
    fn test_rejects_insufficient_funds() {
        let (alice_key, alice) = generate_keypair();
        let (_, bob) = generate_keypair();
        let tx = transfer(&alice_key, &alice, &bob, "10");
        assert!(matches!(
            validate_transaction(&funded(&alice, "5"), &tx, false),
            Err(InvalidTransaction::Balance(
                BalanceError::InsufficientFunds { .. }
            ))
        ));
    }

    #[test]
    fn test_reward_position_rules() {
        let (_, wallet) = generate_keypair();
        let reward = create_block_reward(&wallet);
        assert!(validate_transaction(&Balances::new(), &reward, true).is_ok());

        let mut wrong_amount = reward.clone();
        wrong_amount.coins = "99".parse().unwrap();
        wrong_amount.hash = wrong_amount.calculate_hash();
        assert!(matches!(
            validate_transaction(&Balances::new(), &wrong_amount, true),
            Err(InvalidTransaction::RewardWrongAmount(_))
        ));

        let mut wrong_signature = reward.clone();
        wrong_signature.signature = "not-the-sentinel".to_string();
        assert_eq!(
            validate_transaction(&Balances::new(), &wrong_signature, true),
            Err(InvalidTransaction::RewardBadSignature)
        );

        // a user transfer in the reward position is rejected
        let (alice_key, alice) = generate_keypair();
        let (_, bob) = generate_keypair();
        let tx = transfer(&alice_key, &alice, &bob, "10");
        assert_eq!(
            validate_transaction(&funded(&alice, "100"), &tx, true),
            Err(InvalidTransaction::RewardWithSender)
        );
    }
}
