use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coins::Coins;
use crate::config::{BLOCK_REWARD, BLOCK_REWARD_SIGNATURE};
use crate::crypto::hash::{hash, Hash};
use crate::crypto::keys::PublicKey;
use crate::time;

/// Serde adapter: optional binary `extra_data` travels base64 encoded.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value
            .as_ref()
            .map(|bytes| STANDARD.encode(bytes))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// A transaction committed to a block. The first transaction of every block
/// is the reward: no sender, 100 coins, and a sentinel signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash,
    pub block: Hash,
    pub from_account: Option<PublicKey>,
    pub to_account: PublicKey,
    pub coins: Coins,
    #[serde(with = "base64_bytes", default)]
    pub extra_data: Option<Vec<u8>>,
    pub time: DateTime<Utc>,
    pub signature: String,
}

/// A transaction waiting in the pool: the same shape, not yet attached to a
/// block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnconfirmedTransaction {
    pub hash: Hash,
    pub from_account: Option<PublicKey>,
    pub to_account: PublicKey,
    pub coins: Coins,
    #[serde(with = "base64_bytes", default)]
    pub extra_data: Option<Vec<u8>>,
    pub time: DateTime<Utc>,
    pub signature: String,
}

impl UnconfirmedTransaction {
    /// Materializes the pool entry into a committed transaction row.
    pub fn into_transaction(self, block: Hash) -> Transaction {
        Transaction {
            hash: self.hash,
            block,
            from_account: self.from_account,
            to_account: self.to_account,
            coins: self.coins,
            extra_data: self.extra_data,
            time: self.time,
            signature: self.signature,
        }
    }
}

/// Hash preimage: field order is the protocol's key order and must never
/// change. `extra_data` is lowercase hex when present.
#[derive(Serialize)]
struct TransactionPreimage<'a> {
    from_account: Option<&'a PublicKey>,
    to_account: &'a PublicKey,
    coins: &'a Coins,
    extra_data: Option<String>,
    time: String,
}

/// Content hash shared by confirmed and unconfirmed transactions; the block
/// reference is deliberately not part of it.
pub fn transaction_hash(
    from_account: Option<&PublicKey>,
    to_account: &PublicKey,
    coins: &Coins,
    extra_data: Option<&[u8]>,
    time: &DateTime<Utc>,
) -> Hash {
    let preimage = TransactionPreimage {
        from_account,
        to_account,
        coins,
        extra_data: extra_data.map(hex::encode),
        time: time.to_string(),
    };
    // JSON construction over plain fields cannot fail
    let content = serde_json::to_string(&preimage).expect("preimage serialization");
    hash(content.as_bytes())
}

/// Field access shared by confirmed and unconfirmed transactions, so
/// validation and balance application work on either.
pub trait TransactionData {
    fn hash(&self) -> &Hash;
    fn from_account(&self) -> Option<&PublicKey>;
    fn to_account(&self) -> &PublicKey;
    fn coins(&self) -> Coins;
    fn extra_data(&self) -> Option<&[u8]>;
    fn time(&self) -> DateTime<Utc>;
    fn signature(&self) -> &str;

    /// Recomputes the content hash over the five preimage fields.
    fn calculate_hash(&self) -> Hash {
        transaction_hash(
            self.from_account(),
            self.to_account(),
            &self.coins(),
            self.extra_data(),
            &self.time(),
        )
    }
}

impl TransactionData for Transaction {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn from_account(&self) -> Option<&PublicKey> {
        self.from_account.as_ref()
    }

    fn to_account(&self) -> &PublicKey {
        &self.to_account
    }

    fn coins(&self) -> Coins {
        self.coins
    }

    fn extra_data(&self) -> Option<&[u8]> {
        self.extra_data.as_deref()
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

impl TransactionData for UnconfirmedTransaction {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn from_account(&self) -> Option<&PublicKey> {
        self.from_account.as_ref()
    }

    fn to_account(&self) -> &PublicKey {
        &self.to_account
    }

    fn coins(&self) -> Coins {
        self.coins
    }

    fn extra_data(&self) -> Option<&[u8]> {
        self.extra_data.as_deref()
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

/// Builds the reward transaction that opens a freshly mined block.
pub fn create_block_reward(wallet: &PublicKey) -> UnconfirmedTransaction {
    let time = time::now();
    let hash = transaction_hash(None, wallet, &BLOCK_REWARD, None, &time);
    UnconfirmedTransaction {
        hash,
        from_account: None,
        to_account: wallet.clone(),
        coins: BLOCK_REWARD,
        extra_data: None,
        time,
        signature: BLOCK_REWARD_SIGNATURE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_keypair;

    fn sample() -> UnconfirmedTransaction {
        let (_, from) = generate_keypair();
        let (_, to) = generate_keypair();
        let time = time::now();
        let coins: Coins = "1.50000000".parse().unwrap();
        let hash = transaction_hash(Some(&from), &to, &coins, None, &time);
        UnconfirmedTransaction {
            hash,
            from_account: Some(from),
            to_account: to,
            coins,
            extra_data: None,
            time,
            signature: String::new(),
        }
    }

    #[test]
    fn test_hash_is_stable() {
        let tx = sample();
        assert_eq!(tx.calculate_hash(), tx.hash);
        assert_eq!(tx.calculate_hash(), tx.calculate_hash());
    }

    #[test]
    fn test_hash_covers_every_preimage_field() {
        let tx = sample();
        let base = tx.calculate_hash();

        let mut changed = tx.clone();
        changed.coins = "2".parse().unwrap();
        assert_ne!(changed.calculate_hash(), base);

        let mut changed = tx.clone();
        changed.extra_data = Some(b"payload".to_vec());
        assert_ne!(changed.calculate_hash(), base);

        let mut changed = tx.clone();
        changed.from_account = None;
        assert_ne!(changed.calculate_hash(), base);
    }

    #[test]
    fn test_hash_ignores_block_attachment() {
        let tx = sample();
        let expected = tx.calculate_hash();
        let committed = tx.into_transaction(crate::crypto::hash::hash(b"some block"));
        assert_eq!(committed.calculate_hash(), expected);
    }

    #[test]
    fn test_block_reward_shape() {
        let (_, wallet) = generate_keypair();
        let reward = create_block_reward(&wallet);
        assert_eq!(reward.from_account, None);
        assert_eq!(reward.coins, BLOCK_REWARD);
        assert_eq!(reward.signature, BLOCK_REWARD_SIGNATURE);
        assert_eq!(reward.calculate_hash(), reward.hash);
    }

    #[test]
    fn test_wire_round_trip_with_extra_data() {
        let mut tx = sample();
        tx.extra_data = Some(vec![0, 159, 146, 150]);
        tx.hash = tx.calculate_hash();
        let encoded = serde_json::to_string(&tx).unwrap();
        // binary payloads travel as base64 strings
        assert!(encoded.contains("\"AJ+Slg==\""));
        let decoded: UnconfirmedTransaction = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.calculate_hash(), decoded.hash);
    }
}
