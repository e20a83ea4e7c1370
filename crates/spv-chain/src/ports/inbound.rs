//! # Inbound Ports
//!
//! API trait defining what the chain state can do.

use shared_types::{Block, BlockHeader, Hash};

use crate::domain::ChainError;

/// Outcome of a header batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBatchOutcome {
    /// Headers connected to the chain (main or side branch).
    pub accepted: usize,
    /// Already-stored headers skipped at the start of the batch.
    pub skipped: usize,
    /// Orphan header that ended the batch, stored under its own hash.
    pub orphaned: Option<Hash>,
}

impl HeaderBatchOutcome {
    /// Whether every header in a batch of `len` was connected or skipped.
    pub fn is_complete(&self, len: usize) -> bool {
        self.orphaned.is_none() && self.accepted + self.skipped == len
    }
}

/// Chain state API - inbound port.
pub trait ChainStateApi {
    /// Connect a contiguous run of headers, committing as it goes.
    ///
    /// Returns the number of headers accepted before the batch ended.
    fn accept_header_batch(&mut self, headers: Vec<BlockHeader>) -> Result<usize, ChainError>;

    /// Like [`accept_header_batch`](Self::accept_header_batch) with the full outcome.
    fn accept_headers(
        &mut self,
        headers: Vec<BlockHeader>,
    ) -> Result<HeaderBatchOutcome, ChainError>;

    /// Accept one block.
    ///
    /// `Ok(false)` means pending (orphan or side branch), not rejection.
    fn accept_block(&mut self, block: Block) -> Result<bool, ChainError>;

    /// Check `candidate`'s bits against the difficulty schedule.
    fn verify_difficulty(
        &self,
        candidate: &BlockHeader,
        parent: &BlockHeader,
    ) -> Result<(), ChainError>;

    /// Exponentially spaced ancestor hashes, tip first, genesis last.
    fn block_locator(&self) -> Result<Vec<Hash>, ChainError>;

    /// Drop main-chain blocks above `height`.
    fn rollback_to(&mut self, height: i32) -> Result<(), ChainError>;

    fn tip(&self) -> &BlockHeader;

    fn height(&self) -> i32 {
        self.tip().height
    }
}
