// Merkle root calculation for transaction hashes

use sha3::{Digest, Sha3_256};
use thiserror::Error;

use super::hash::Hash;

#[derive(Debug, Error, PartialEq)]
#[error("cannot compute a merkle root over zero transactions")]
pub struct EmptyMerkleTree;

/// Root of a binary SHA3-256 merkle tree over the given hashes.
///
/// Nodes pair left-to-right; an odd node at the end of a level pairs with
/// itself. A single hash is its own root. Blocks always carry at least the
/// reward transaction, so the empty input is an error.
pub fn calculate_merkle_root(hashes: &[Hash]) -> Result<Hash, EmptyMerkleTree> {
    if hashes.is_empty() {
        return Err(EmptyMerkleTree);
    }

    let mut level = hashes.to_vec();
    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            next_level.push(hash_pair(left, right));
        }
        level = next_level;
    }

    Ok(level.remove(0))
}

/// Hash a pair of nodes: SHA3-256(left || right)
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::hash;

    #[test]
    fn test_empty_input_is_an_error() {
        assert_eq!(calculate_merkle_root(&[]), Err(EmptyMerkleTree));
    }

    #[test]
    fn test_single_hash_is_its_own_root() {
        let leaf = hash(b"only");
        assert_eq!(calculate_merkle_root(&[leaf.clone()]).unwrap(), leaf);
    }

    #[test]
    fn test_two_hashes() {
        let a = hash(b"a");
        let b = hash(b"b");
        let root = calculate_merkle_root(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(root, hash_pair(&a, &b));
    }

    #[test]
    fn test_three_hashes_duplicate_the_last() {
        let a = hash(b"a");
        let b = hash(b"b");
        let c = hash(b"c");
        let root = calculate_merkle_root(&[a.clone(), b.clone(), c.clone()]).unwrap();

        // Level 0: [a, b, c]
        // Level 1: [H(a||b), H(c||c)]
        // Level 2: H(H(a||b) || H(c||c))
        let ab = hash_pair(&a, &b);
        let cc = hash_pair(&c, &c);
        assert_eq!(root, hash_pair(&ab, &cc));
    }

    #[test]
    fn test_four_hashes() {
        let leaves: Vec<Hash> = [b"a" as &[u8], b"b", b"c", b"d"]
            .iter()
            .map(|v| hash(v))
            .collect();
        let root = calculate_merkle_root(&leaves).unwrap();

        let ab = hash_pair(&leaves[0], &leaves[1]);
        let cd = hash_pair(&leaves[2], &leaves[3]);
        assert_eq!(root, hash_pair(&ab, &cd));
    }

    #[test]
    fn test_order_matters() {
        let a = hash(b"a");
        let b = hash(b"b");
        let forward = calculate_merkle_root(&[a.clone(), b.clone()]).unwrap();
        let backward = calculate_merkle_root(&[b, a]).unwrap();
        assert_ne!(forward, backward);
    }
}
