//! Merkle inclusion proofs against committed block roots.
//!
//! Siblings travel in internal (wire) byte order, bottom-up; the stored
//! merkle roots are display-order, so the final comparison reverses the
//! folded hash.

use crate::chain::HeaderOracle;
use crate::error::{Error, Result};
use crate::hashes::{sha256d, BlockHash, TxMerkleNode};

/// Folds a merkle branch bottom-up from a leaf.
///
/// `tx_index` is the transaction's position in the block; its parity at each
/// level decides whether the sibling concatenates on the right or the left.
/// Returns `None` for a structurally invalid proof: a left sibling equal to
/// the running hash (the duplicated-element mutation vector of
/// CVE-2012-2459), or a branch too short to reach the root.
pub fn fold_merkle_branch(leaf: [u8; 32], tx_index: u32, proof: &[[u8; 32]]) -> Option<[u8; 32]> {
    let mut hash = leaf;
    let mut index = tx_index;
    let mut concat = [0u8; 64];
    for sibling in proof {
        if index % 2 == 0 {
            concat[..32].copy_from_slice(&hash);
            concat[32..].copy_from_slice(sibling);
        } else {
            if *sibling == hash {
                return None;
            }
            concat[..32].copy_from_slice(sibling);
            concat[32..].copy_from_slice(&hash);
        }
        hash = sha256d(&concat);
        index /= 2;
    }
    // A nonzero residue means the branch stopped short of the root.
    if index != 0 {
        return None;
    }
    Some(hash)
}

impl HeaderOracle {
    /// Verifies that `tx_data` is committed by the merkle root of the
    /// resolved block.
    ///
    /// The block is resolved by `block_height` when `block_hash` is zero,
    /// and by `block_hash` (with `block_height` required to be zero)
    /// otherwise; `require_safe` applies the canonical-and-finalized gate
    /// either way. Gating failures are errors; an invalid proof (wrong
    /// sibling, duplicated odd-row sibling, truncated branch, root
    /// mismatch) is `Ok(false)`.
    ///
    /// `tx_data` must be longer than 64 bytes so an inner tree node can
    /// never impersonate a transaction.
    pub fn validate_transaction(
        &self,
        block_height: u64,
        block_hash: BlockHash,
        require_safe: bool,
        tx_index: u32,
        tx_data: &[u8],
        proof: &[[u8; 32]],
    ) -> Result<bool> {
        if tx_data.len() <= 64 {
            return Err(Error::BadProofInput("tx data must be longer than 64 bytes"));
        }

        let record = if block_hash.is_zero() {
            let resolved = self.block_hash_by_height(block_height, require_safe)?;
            self.header_by_hash(&resolved, false)?
        } else {
            if block_height != 0 {
                return Err(Error::BadProofInput(
                    "pass either a block hash or a height, not both",
                ));
            }
            self.header_by_hash(&block_hash, require_safe)?
        };

        let leaf = sha256d(tx_data);
        let root = match fold_merkle_branch(leaf, tx_index, proof) {
            Some(root) => root,
            None => return Ok(false),
        };
        Ok(TxMerkleNode::from_internal_byte_array(root) == record.header.merkle_root)
    }
}

#[cfg(test)]
mod tests {
    use crate::blockdata::Header;
    use crate::consensus::Params;
    use crate::pow::CompactTarget;

    use super::*;

    const ANCHOR_HEIGHT: u64 = 2_016_000;

    /// A synthetic transaction payload, longer than the 64-byte floor.
    fn tx_data(tag: u8) -> Vec<u8> {
        let mut data = vec![tag; 100];
        data[0] = 0x01;
        data[99] = tag.wrapping_add(1);
        data
    }

    /// Builds a Bitcoin-style merkle tree over the leaves, duplicating the
    /// last element of odd rows, and returns the root plus every branch.
    fn build_tree(leaves: &[[u8; 32]]) -> ([u8; 32], Vec<Vec<[u8; 32]>>) {
        let mut branches = vec![Vec::new(); leaves.len()];
        let mut level: Vec<[u8; 32]> = leaves.to_vec();
        let mut positions: Vec<usize> = (0..leaves.len()).collect();
        let mut concat = [0u8; 64];

        while level.len() > 1 {
            for (tx, position) in positions.iter_mut().enumerate() {
                let sibling_index = *position ^ 1;
                let sibling = if sibling_index < level.len() {
                    level[sibling_index]
                } else {
                    level[*position]
                };
                branches[tx].push(sibling);
                *position /= 2;
            }
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                concat[..32].copy_from_slice(&pair[0]);
                concat[32..].copy_from_slice(&right);
                next.push(sha256d(&concat));
            }
            level = next;
        }
        (level[0], branches)
    }

    /// An oracle anchored at a block committing to the given transactions.
    fn oracle_for_txs(txs: &[Vec<u8>]) -> (HeaderOracle, BlockHash, Vec<Vec<[u8; 32]>>) {
        let leaves: Vec<[u8; 32]> = txs.iter().map(|tx| sha256d(tx)).collect();
        let (root, branches) = build_tree(&leaves);

        let anchor = Header {
            version: 0x2000_0000,
            prev_blockhash: BlockHash::from_byte_array([0x11; 32]),
            merkle_root: TxMerkleNode::from_internal_byte_array(root),
            timestamp: 1_600_000_000,
            bits: CompactTarget::new(0x1d00ffff),
            nonce: 0,
        };
        let (oracle, _) =
            HeaderOracle::initialize(Params::BITCOIN, ANCHOR_HEIGHT, &anchor.serialize(), false)
                .unwrap();
        let hash = anchor.block_hash();
        (oracle, hash, branches)
    }

    #[test]
    fn test_valid_proofs_by_hash_and_height() {
        let txs: Vec<Vec<u8>> = (0..4).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);

        for (tx_index, tx) in txs.iter().enumerate() {
            let proof = &branches[tx_index];
            assert_eq!(
                oracle.validate_transaction(
                    0,
                    block_hash,
                    false,
                    tx_index as u32,
                    tx,
                    proof,
                ),
                Ok(true),
                "tx {tx_index}"
            );
            assert_eq!(
                oracle.validate_transaction(
                    ANCHOR_HEIGHT,
                    BlockHash::ZERO,
                    false,
                    tx_index as u32,
                    tx,
                    proof,
                ),
                Ok(true),
                "tx {tx_index} by height"
            );
        }
    }

    #[test]
    fn test_odd_row_duplicates_last_element() {
        // Three transactions force the duplicated-last-element rule.
        let txs: Vec<Vec<u8>> = (0..3).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 2, &txs[2], &branches[2]),
            Ok(true)
        );
    }

    #[test]
    fn test_mutated_sibling_fails() {
        let txs: Vec<Vec<u8>> = (0..4).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);

        let mut proof = branches[1].clone();
        proof[0][7] ^= 0x01;
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 1, &txs[1], &proof),
            Ok(false)
        );
    }

    #[test]
    fn test_truncated_proof_fails() {
        let txs: Vec<Vec<u8>> = (0..4).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);

        // Dropping the top sibling leaves a nonzero index residue.
        let truncated = &branches[3][..1];
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 3, &txs[3], truncated),
            Ok(false)
        );
    }

    #[test]
    fn test_duplicated_left_sibling_fails() {
        let txs: Vec<Vec<u8>> = (0..4).map(tx_data).collect();
        let (oracle, block_hash, _) = oracle_for_txs(&txs);

        // A proof claiming the running hash as its own left sibling is the
        // CVE-2012-2459 mutation and must be rejected outright.
        let leaf = sha256d(&txs[1]);
        let forged = vec![leaf];
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 1, &txs[1], &forged),
            Ok(false)
        );
    }

    #[test]
    fn test_wrong_transaction_fails() {
        let txs: Vec<Vec<u8>> = (0..4).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 0, &txs[1], &branches[0]),
            Ok(false)
        );
    }

    #[test]
    fn test_short_tx_data_rejected() {
        let txs: Vec<Vec<u8>> = (0..2).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 0, &[0u8; 64], &branches[0]),
            Err(Error::BadProofInput("tx data must be longer than 64 bytes"))
        );
    }

    #[test]
    fn test_hash_and_height_together_rejected() {
        let txs: Vec<Vec<u8>> = (0..2).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);
        assert_eq!(
            oracle.validate_transaction(
                ANCHOR_HEIGHT,
                block_hash,
                false,
                0,
                &txs[0],
                &branches[0],
            ),
            Err(Error::BadProofInput(
                "pass either a block hash or a height, not both",
            ))
        );
    }

    #[test]
    fn test_unknown_block_rejected() {
        let txs: Vec<Vec<u8>> = (0..2).map(tx_data).collect();
        let (oracle, _, branches) = oracle_for_txs(&txs);
        let unknown = BlockHash::from_byte_array([0x99; 32]);
        assert_eq!(
            oracle.validate_transaction(0, unknown, false, 0, &txs[0], &branches[0]),
            Err(Error::BlockNotFound)
        );
    }

    #[test]
    fn test_safe_validation_requires_confirmations() {
        let txs: Vec<Vec<u8>> = (0..2).map(tx_data).collect();
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);
        // The anchor is the tip: one confirmation.
        assert_eq!(
            oracle.validate_transaction(0, block_hash, true, 0, &txs[0], &branches[0]),
            Err(Error::InsufficientConfirmations { got: 1, need: 6 })
        );
    }

    #[test]
    fn test_single_transaction_block() {
        // A single transaction is its own root; the proof is empty.
        let txs = vec![tx_data(9)];
        let (oracle, block_hash, branches) = oracle_for_txs(&txs);
        assert!(branches[0].is_empty());
        assert_eq!(
            oracle.validate_transaction(0, block_hash, false, 0, &txs[0], &branches[0]),
            Ok(true)
        );
    }

    #[test]
    fn test_fold_merkle_branch_residue() {
        let leaf = [0x42; 32];
        // Index 5 with a two-level proof leaves residue 1.
        assert_eq!(fold_merkle_branch(leaf, 5, &[[1; 32], [2; 32]]), None);
        assert!(fold_merkle_branch(leaf, 5, &[[1; 32], [2; 32], [3; 32]]).is_some());
    }
}
