pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{hash, Hash, HASH_SIZE};
pub use keys::{generate_keypair, public_key_for, sign, verify, CryptoError, PublicKey};
pub use merkle::{calculate_merkle_root, EmptyMerkleTree};
