//! Merkle branch and witness-commitment computation.
//!
//! The pool never needs a full Merkle tree: the coinbase always sits at leaf
//! index 0, so a single branch of sibling hashes is enough for both the
//! miner (who folds its rolled coinbase txid up to the root) and the share
//! validator (which repeats the same fold). All hashes here are 32-byte
//! values in internal byte order.

use bitcoin::hashes::{Hash, sha256d};

/// BIP-141 witness reserved value carried in the coinbase witness stack.
pub const WITNESS_RESERVED_VALUE: [u8; 32] = [0u8; 32];

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256d::Hash::hash(&buf).to_byte_array()
}

/// Sibling hashes proving leaf index 0 of `[coinbase, txids...]`.
///
/// The coinbase leaf is a placeholder (its real txid is only known once the
/// miner picks an extranonce2), so a 32-zero stand-in occupies index 0.
/// At each level the sibling of the tracked node is recorded (duplicating
/// the node itself at a right edge with no sibling), then the level is
/// pair-hashed and the index halved until one node remains.
pub fn coinbase_branch(txids: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut level: Vec<[u8; 32]> = Vec::with_capacity(txids.len() + 1);
    level.push([0u8; 32]);
    level.extend_from_slice(txids);

    let mut branch = Vec::new();
    let mut index = 0usize;
    while level.len() > 1 {
        let sibling = if index % 2 == 0 {
            *level.get(index + 1).unwrap_or(&level[index])
        } else {
            level[index - 1]
        };
        branch.push(sibling);

        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_pair(&pair[0], right));
        }
        level = next;
        index /= 2;
    }
    branch
}

/// Fold a coinbase txid through a branch to the Merkle root.
///
/// The coinbase is the leftmost leaf, so every step hashes the accumulator
/// on the left and the sibling on the right.
pub fn fold_branch(coinbase_txid: [u8; 32], branch: &[[u8; 32]]) -> [u8; 32] {
    branch
        .iter()
        .fold(coinbase_txid, |acc, sibling| hash_pair(&acc, sibling))
}

/// Merkle root over a full leaf list, duplicating the last node of odd
/// levels.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_pair(&pair[0], right));
        }
        level = next;
    }
    level[0]
}

/// BIP-141 witness commitment over the template's wtxids.
///
/// The coinbase wtxid is defined as 32 zero bytes; the commitment hashes
/// the witness Merkle root together with the witness reserved value.
pub fn witness_commitment(wtxids: &[[u8; 32]]) -> [u8; 32] {
    let mut leaves = Vec::with_capacity(wtxids.len() + 1);
    leaves.push([0u8; 32]);
    leaves.extend_from_slice(wtxids);
    let root = merkle_root(&leaves);
    hash_pair(&root, &WITNESS_RESERVED_VALUE)
}
