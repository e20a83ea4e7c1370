//! # Partial Merkle Tree
//!
//! Compact proof carried by `merkleblock`: a depth-first traversal of the
//! block's merkle tree where each visited node consumes one flag bit and
//! pruned subtrees or leaves consume one hash.
//!
//! Flag bits are packed LSB-first. A set bit marks a node that is an ancestor
//! of (or is) a matched transaction.

use serde::{Deserialize, Serialize};
use shared_types::{
    hash_pair, write_var_bytes, write_var_int, Decodable, DecodeError, Encodable, Hash, WireReader,
};

use super::errors::MerkleError;

/// Legacy block size limit used to bound the leaf count.
pub const MAX_BLOCK_SIZE: u32 = 1_000_000;

/// Smallest possible transaction is 60 bytes.
pub const MAX_MERKLE_LEAVES: u32 = MAX_BLOCK_SIZE / 60;

/// Result of a successful extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedMatches {
    /// Matched transaction hashes, in block order.
    pub matched_hashes: Vec<Hash>,
    pub computed_root: Hash,
}

/// Partial merkle tree as sent in `merkleblock`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    leaf_count: u32,
    hashes: Vec<Hash>,
    flags: Vec<u8>,
}

/// Width of the tree at `height` for `leaves` leaves.
fn tree_width(leaves: u32, height: u32) -> u32 {
    let leaves = u64::from(leaves);
    ((leaves + (1u64 << height) - 1) >> height) as u32
}

fn tree_height(leaves: u32) -> u32 {
    let mut height = 0;
    while tree_width(leaves, height) > 1 {
        height += 1;
    }
    height
}

/// Traversal state for a single extraction.
struct Extractor<'a> {
    proof: &'a MerkleProof,
    bits_used: usize,
    hashes_used: usize,
    matched: Vec<Hash>,
}

impl Extractor<'_> {
    fn next_bit(&mut self) -> Result<bool, MerkleError> {
        let idx = self.bits_used;
        let byte = *self.proof.flags.get(idx / 8).ok_or(MerkleError::Overflow)?;
        self.bits_used += 1;
        Ok(byte & (1 << (idx % 8)) != 0)
    }

    fn next_hash(&mut self) -> Result<Hash, MerkleError> {
        let hash = *self
            .proof
            .hashes
            .get(self.hashes_used)
            .ok_or(MerkleError::Overflow)?;
        self.hashes_used += 1;
        Ok(hash)
    }

    fn traverse(&mut self, height: u32, pos: u32) -> Result<Hash, MerkleError> {
        let parent_of_match = self.next_bit()?;
        if height == 0 || !parent_of_match {
            let hash = self.next_hash()?;
            if height == 0 && parent_of_match {
                self.matched.push(hash);
            }
            return Ok(hash);
        }

        let left = self.traverse(height - 1, pos * 2)?;
        let right = if pos * 2 + 1 < tree_width(self.proof.leaf_count, height - 1) {
            let right = self.traverse(height - 1, pos * 2 + 1)?;
            if right == left {
                return Err(MerkleError::IdenticalBranches);
            }
            right
        } else {
            left
        };
        Ok(hash_pair(&left, &right))
    }
}

impl MerkleProof {
    pub fn new(leaf_count: u32, hashes: Vec<Hash>, flags: Vec<u8>) -> Self {
        Self {
            leaf_count,
            hashes,
            flags,
        }
    }

    /// Build the proof for `leaves` where `matches[i]` selects leaf `i`.
    ///
    /// Missing entries in `matches` count as unmatched.
    pub fn from_leaves(leaves: &[Hash], matches: &[bool]) -> Self {
        let leaf_count = leaves.len() as u32;
        let mut builder = Builder {
            leaves,
            matches,
            bits: Vec::new(),
            hashes: Vec::new(),
        };
        if !leaves.is_empty() {
            builder.build(tree_height(leaf_count), 0);
        }

        let mut flags = vec![0u8; (builder.bits.len() + 7) / 8];
        for (i, bit) in builder.bits.iter().enumerate() {
            if *bit {
                flags[i / 8] |= 1 << (i % 8);
            }
        }
        Self {
            leaf_count,
            hashes: builder.hashes,
            flags,
        }
    }

    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    pub fn hashes(&self) -> &[Hash] {
        &self.hashes
    }

    pub fn flags(&self) -> &[u8] {
        &self.flags
    }

    /// Walk the tree, collecting matched hashes and recomputing the root.
    ///
    /// Every flag byte and every hash must be consumed, and the computed root
    /// must equal `expected_root`.
    pub fn extract(&self, expected_root: &Hash) -> Result<ExtractedMatches, MerkleError> {
        if self.leaf_count == 0 {
            return Err(MerkleError::NoTransactions);
        }
        if self.leaf_count > MAX_MERKLE_LEAVES {
            return Err(MerkleError::TooManyTransactions {
                count: self.leaf_count,
                max: MAX_MERKLE_LEAVES,
            });
        }
        if self.hashes.len() > self.leaf_count as usize {
            return Err(MerkleError::TooManyHashes {
                hashes: self.hashes.len(),
                leaves: self.leaf_count,
            });
        }
        // Every hash needs at least one flag bit.
        if self.flags.len() * 8 < self.hashes.len() {
            return Err(MerkleError::Overflow);
        }

        let mut extractor = Extractor {
            proof: self,
            bits_used: 0,
            hashes_used: 0,
            matched: Vec::new(),
        };
        let root = extractor.traverse(tree_height(self.leaf_count), 0)?;

        if (extractor.bits_used + 7) / 8 != self.flags.len() {
            return Err(MerkleError::UnusedBits {
                used_bits: extractor.bits_used,
                flag_bytes: self.flags.len(),
            });
        }
        if extractor.hashes_used != self.hashes.len() {
            return Err(MerkleError::UnusedHashes {
                used: extractor.hashes_used,
                total: self.hashes.len(),
            });
        }
        if root != *expected_root {
            return Err(MerkleError::RootMismatch);
        }

        Ok(ExtractedMatches {
            matched_hashes: extractor.matched,
            computed_root: root,
        })
    }
}

struct Builder<'a> {
    leaves: &'a [Hash],
    matches: &'a [bool],
    bits: Vec<bool>,
    hashes: Vec<Hash>,
}

impl Builder<'_> {
    fn leaf_count(&self) -> u32 {
        self.leaves.len() as u32
    }

    fn node_hash(&self, height: u32, pos: u32) -> Hash {
        if height == 0 {
            return self.leaves[pos as usize];
        }
        let left = self.node_hash(height - 1, pos * 2);
        let right = if pos * 2 + 1 < tree_width(self.leaf_count(), height - 1) {
            self.node_hash(height - 1, pos * 2 + 1)
        } else {
            left
        };
        hash_pair(&left, &right)
    }

    fn build(&mut self, height: u32, pos: u32) {
        let start = (pos as usize) << height;
        let end = ((pos as usize + 1) << height).min(self.leaves.len());
        let parent_of_match = (start..end).any(|i| self.matches.get(i).copied().unwrap_or(false));
        self.bits.push(parent_of_match);

        if height == 0 || !parent_of_match {
            let hash = self.node_hash(height, pos);
            self.hashes.push(hash);
        } else {
            self.build(height - 1, pos * 2);
            if pos * 2 + 1 < tree_width(self.leaf_count(), height - 1) {
                self.build(height - 1, pos * 2 + 1);
            }
        }
    }
}

/// Merkle root of `leaves`, duplicating the last node on odd levels.
///
/// Returns the zero hash for an empty list.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return shared_types::ZERO_HASH;
    }
    let builder = Builder {
        leaves,
        matches: &[],
        bits: Vec::new(),
        hashes: Vec::new(),
    };
    builder.node_hash(tree_height(leaves.len() as u32), 0)
}

impl Encodable for MerkleProof {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.leaf_count.to_le_bytes());
        write_var_int(out, self.hashes.len() as u64);
        for hash in &self.hashes {
            out.extend_from_slice(hash);
        }
        write_var_bytes(out, &self.flags);
    }
}

impl Decodable for MerkleProof {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let leaf_count = reader.read_u32()?;
        let count = reader.read_count(MAX_MERKLE_LEAVES as usize)?;
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            hashes.push(reader.read_hash()?);
        }
        let flags = reader.read_var_bytes()?;
        Ok(Self {
            leaf_count,
            hashes,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::double_sha256;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| double_sha256(&(i as u64).to_le_bytes())).collect()
    }

    #[test]
    fn test_single_transaction_block() {
        let txs = leaves(1);
        let proof = MerkleProof::from_leaves(&txs, &[true]);
        let extracted = proof.extract(&txs[0]).unwrap();
        assert_eq!(extracted.matched_hashes, txs);
        assert_eq!(extracted.computed_root, txs[0]);
    }

    #[test]
    fn test_no_matches_yields_root_only() {
        let txs = leaves(7);
        let root = merkle_root(&txs);
        let proof = MerkleProof::from_leaves(&txs, &[false; 7]);
        assert_eq!(proof.hashes(), &[root]);
        let extracted = proof.extract(&root).unwrap();
        assert!(extracted.matched_hashes.is_empty());
    }

    #[test]
    fn test_zero_leaves_rejected() {
        let proof = MerkleProof::new(0, vec![], vec![]);
        assert_eq!(proof.extract(&[0; 32]), Err(MerkleError::NoTransactions));
    }

    #[test]
    fn test_too_many_leaves_rejected() {
        let proof = MerkleProof::new(MAX_MERKLE_LEAVES + 1, vec![[1; 32]], vec![0]);
        assert!(matches!(
            proof.extract(&[0; 32]),
            Err(MerkleError::TooManyTransactions { .. })
        ));
    }

    #[test]
    fn test_more_hashes_than_leaves_rejected() {
        let proof = MerkleProof::new(1, vec![[1; 32], [2; 32]], vec![0xff]);
        assert!(matches!(
            proof.extract(&[0; 32]),
            Err(MerkleError::TooManyHashes { hashes: 2, leaves: 1 })
        ));
    }

    #[test]
    fn test_truncated_flag_bits_overflow() {
        let txs = leaves(20);
        let mut matches = vec![false; 20];
        matches[3] = true;
        matches[17] = true;
        let proof = MerkleProof::from_leaves(&txs, &matches);
        let root = merkle_root(&txs);
        assert!(proof.flags().len() > 1);
        assert!(proof.extract(&root).is_ok());

        // Fewer flag bits than hashes.
        let no_flags = MerkleProof::new(20, proof.hashes().to_vec(), vec![]);
        assert_eq!(no_flags.extract(&root), Err(MerkleError::Overflow));

        // Enough bits for the hash count, but the walk runs past them.
        let one_byte = MerkleProof::new(20, proof.hashes().to_vec(), vec![proof.flags()[0]]);
        assert_eq!(one_byte.extract(&root), Err(MerkleError::Overflow));
    }

    #[test]
    fn test_missing_hash_overflows() {
        let txs = leaves(4);
        let proof = MerkleProof::from_leaves(&txs, &[true, false, false, true]);
        let mut hashes = proof.hashes().to_vec();
        hashes.pop();
        let broken = MerkleProof::new(4, hashes, proof.flags().to_vec());
        assert_eq!(broken.extract(&merkle_root(&txs)), Err(MerkleError::Overflow));
    }

    #[test]
    fn test_extra_hash_unused() {
        let txs = leaves(4);
        let proof = MerkleProof::from_leaves(&txs, &[false, true, false, false]);
        let mut hashes = proof.hashes().to_vec();
        hashes.push([9; 32]);
        let broken = MerkleProof::new(4, hashes, proof.flags().to_vec());
        assert!(matches!(
            broken.extract(&merkle_root(&txs)),
            Err(MerkleError::UnusedHashes { .. })
        ));
    }

    #[test]
    fn test_extra_flag_byte_unused() {
        let txs = leaves(4);
        let proof = MerkleProof::from_leaves(&txs, &[false, true, false, false]);
        let mut flags = proof.flags().to_vec();
        flags.push(0);
        let broken = MerkleProof::new(4, proof.hashes().to_vec(), flags);
        assert!(matches!(
            broken.extract(&merkle_root(&txs)),
            Err(MerkleError::UnusedBits { .. })
        ));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let txs = leaves(5);
        let proof = MerkleProof::from_leaves(&txs, &[true, false, false, false, true]);
        assert_eq!(proof.extract(&[7; 32]), Err(MerkleError::RootMismatch));
    }

    #[test]
    fn test_identical_branches_rejected() {
        // Duplicating the last transaction of an odd block yields the same
        // root; the partial tree must refuse the duplicated branch.
        let mut txs = leaves(3);
        txs.push(txs[2]);
        let proof = MerkleProof::from_leaves(&txs, &[false, false, true, true]);
        assert_eq!(
            proof.extract(&merkle_root(&txs)),
            Err(MerkleError::IdenticalBranches)
        );
    }

    #[test]
    fn test_wire_encoding_layout() {
        let txs = leaves(3);
        let proof = MerkleProof::from_leaves(&txs, &[false, true, false]);
        let bytes = proof.to_bytes();
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(bytes[4] as usize, proof.hashes().len());
        assert_eq!(MerkleProof::from_bytes(&bytes).unwrap(), proof);
    }

    proptest! {
        #[test]
        fn prop_extract_recovers_matches(
            n in 1usize..300,
            seed in any::<u64>(),
            density in 0u32..100,
        ) {
            let txs = leaves(n);
            let mut state = seed;
            let matches: Vec<bool> = (0..n)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    ((state >> 33) % 100) < u64::from(density)
                })
                .collect();

            let proof = MerkleProof::from_leaves(&txs, &matches);
            let root = merkle_root(&txs);
            let extracted = proof.extract(&root).unwrap();

            let expected: Vec<Hash> = txs
                .iter()
                .zip(&matches)
                .filter(|(_, m)| **m)
                .map(|(h, _)| *h)
                .collect();
            prop_assert_eq!(extracted.matched_hashes, expected);
            prop_assert_eq!(extracted.computed_root, root);
            prop_assert!(proof.hashes().len() <= n);
        }
    }
}
