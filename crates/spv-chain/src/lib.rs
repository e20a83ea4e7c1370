//! # SPV Chain
//!
//! Header-chain state for an SPV wallet: which headers are trusted, how
//! competing branches are resolved and how filtered blocks prove inclusion.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Module Structure
//!
//! ```text
//! spv-chain/
//! ├── domain/          # Difficulty, merkle proofs, locators, errors
//! ├── ports/           # ChainStateApi (inbound) + BlockStore, TimeSource (outbound)
//! ├── service/         # ChainState: headers, blocks, reorgs, rollbacks
//! ├── test_utils.rs    # Mined regtest chain builders (feature `test-utils`)
//! └── config.rs        # ChainParams per network
//! ```
//!
//! ## Invariants
//!
//! | Rule | Enforcement |
//! |------|-------------|
//! | Proof of work | Header hash ≤ declared target ≤ network maximum |
//! | Difficulty | Bits equal the parent's, except at interval boundaries |
//! | Atomic reorg | Demotions and promotions land in one store commit |
//! | Checkpoint | Competing blocks at or below it are refused |
//! | Merkle proofs | Every hash and flag bit consumed, no identical siblings |

#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

/// Mined regtest chain builders.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ChainParams, Network, DIFFICULTY_INTERVAL, TARGET_TIMESPAN};
pub use domain::{
    check_proof_of_work, decode_compact, encode_compact, locator_heights, merkle_root,
    next_target, target_matches, ChainError, ConsensusError, ExtractedMatches, MerkleError,
    MerkleProof, StoreError, MAX_FUTURE_DRIFT_SECS, MAX_MERKLE_LEAVES,
};
pub use ports::{
    BlockStore, ChainStateApi, FixedTimeSource, HeaderBatchOutcome, InMemoryBlockStore, StoreOp,
    SystemTimeSource, TimeSource,
};
pub use service::ChainState;
