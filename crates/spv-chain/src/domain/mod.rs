//! # Domain Layer
//!
//! Pure chain logic: difficulty, merkle proofs, locators, errors.

pub mod difficulty;
pub mod errors;
pub mod locator;
pub mod merkle_proof;

pub use difficulty::{
    check_proof_of_work, decode_compact, encode_compact, next_target, target_matches,
    MAX_FUTURE_DRIFT_SECS,
};
pub use errors::{ChainError, ConsensusError, MerkleError, StoreError};
pub use locator::locator_heights;
pub use merkle_proof::{merkle_root, ExtractedMatches, MerkleProof, MAX_MERKLE_LEAVES};
