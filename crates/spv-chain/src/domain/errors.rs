//! # Domain Errors
//!
//! Error types for chain state, difficulty checks, merkle proofs and the
//! block store.

use thiserror::Error;

/// Header or block failed a consensus check.
///
/// The originating peer is abandoned when one of these surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// Bits do not match the value required at this height.
    #[error("Difficulty mismatch at height {height}: expected {expected:#010x}, got {actual:#010x}")]
    DifficultyMismatch {
        height: i32,
        expected: u32,
        actual: u32,
    },

    /// Header hash is above its declared target.
    #[error("Proof of work invalid for block {hash}")]
    InvalidProofOfWork { hash: String },

    /// Compact bits decode to zero, a negative value or above the network limit.
    #[error("Target out of range: bits {bits:#010x}")]
    TargetOutOfRange { bits: u32 },

    /// Header timestamp is more than two hours ahead of local time.
    #[error("Timestamp {timestamp} too far in the future (now {now})")]
    TimestampTooFarInFuture { timestamp: u32, now: u64 },

    /// Partial merkle tree does not commit to the header's merkle root.
    #[error("Merkle proof rejected for block {hash}: {reason}")]
    MerkleRootMismatch { hash: String, reason: MerkleError },
}

/// Partial merkle tree could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("Merkle block has no transactions")]
    NoTransactions,

    #[error("Too many transactions: {count} > {max}")]
    TooManyTransactions { count: u32, max: u32 },

    #[error("More hashes than transactions: {hashes} > {leaves}")]
    TooManyHashes { hashes: usize, leaves: u32 },

    /// Ran out of flag bits or hashes while walking the tree.
    #[error("Partial merkle tree overflowed its flag bits or hashes")]
    Overflow,

    #[error("Unused hashes: consumed {used} of {total}")]
    UnusedHashes { used: usize, total: usize },

    #[error("Unused flag bits: consumed {used_bits} bits of {flag_bytes} bytes")]
    UnusedBits { used_bits: usize, flag_bytes: usize },

    /// Left and right children are equal (CVE-2012-2459 malleation).
    #[error("Identical merkle branches")]
    IdenticalBranches,

    #[error("Computed merkle root does not match header")]
    RootMismatch,
}

/// Block store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Block not found: {0}")]
    NotFound(String),

    #[error("Store inconsistency: {0}")]
    Inconsistent(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Chain state error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Consensus violation: {0}")]
    Consensus(#[from] ConsensusError),

    /// Competing block at or below the trusted checkpoint.
    #[error("Block at height {height} is at or below checkpoint {checkpoint}")]
    TooOld { height: i32, checkpoint: i32 },

    #[error("Rollback to height {target} refused (tip {tip}): {reason}")]
    RollbackRefused {
        target: i32,
        tip: i32,
        reason: String,
    },

    /// A stored block's ancestor could not be found.
    #[error("Missing ancestor {hash}")]
    MissingAncestor { hash: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ChainError {
    /// Whether the error is the peer's fault (bad data) rather than local.
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, ChainError::Consensus(_) | ChainError::TooOld { .. })
    }
}
