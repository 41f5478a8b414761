use indexmap::IndexMap;
use thiserror::Error;

use crate::coins::Coins;
use crate::crypto::keys::PublicKey;
use crate::transaction::TransactionData;

/// Per-account balances as of a block. Insertion order is preserved: the
/// map's own serialization is part of the block hash preimage, so two nodes
/// that apply the same transactions in the same order agree byte for byte.
pub type Balances = IndexMap<PublicKey, Coins>;

#[derive(Debug, Error, PartialEq)]
pub enum BalanceError {
    #[error("insufficient funds: {available} < {required}")]
    InsufficientFunds { available: Coins, required: Coins },
    #[error("balance overflow crediting {0}")]
    Overflow(PublicKey),
}

/// Applies one transaction and returns the updated map. The sender, when
/// set, is debited before the receiver is credited; an absent sender entry
/// counts as a zero balance.
pub fn apply_transaction<T: TransactionData>(
    mut balances: Balances,
    transaction: &T,
) -> Result<Balances, BalanceError> {
    if let Some(from) = transaction.from_account() {
        let available = balances.get(from).copied().unwrap_or(Coins::ZERO);
        let remaining = available.checked_sub(transaction.coins()).ok_or(
            BalanceError::InsufficientFunds {
                available,
                required: transaction.coins(),
            },
        )?;
        balances.insert(from.clone(), remaining);
    }

    let to = transaction.to_account();
    let credited = balances
        .get(to)
        .copied()
        .unwrap_or(Coins::ZERO)
        .checked_add(transaction.coins())
        .ok_or_else(|| BalanceError::Overflow(to.clone()))?;
    balances.insert(to.clone(), credited);

    Ok(balances)
}

/// Left fold of [`apply_transaction`]; stops at the first failure.
pub fn apply_transactions<T: TransactionData>(
    mut balances: Balances,
    transactions: &[T],
) -> Result<Balances, BalanceError> {
    for transaction in transactions {
        balances = apply_transaction(balances, transaction)?;
    }
    Ok(balances)
}
