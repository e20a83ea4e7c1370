//! # Outbound Ports
//!
//! Dependencies required by the chain state: block persistence and a clock.
//!
//! Production hosts plug in their own storage engine; `InMemoryBlockStore`
//! backs tests and the reference node.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use shared_types::{hash_to_hex, Block, Hash};

use crate::domain::StoreError;

/// One staged mutation of the block store.
///
/// A `Vec<StoreOp>` passed to [`BlockStore::commit`] is applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Insert or replace a block; its header's `height`/`is_main` are stored as-is.
    Add(Block),
    /// Delete a block by hash.
    Remove(Hash),
    /// Flip a stored block's main-chain flag.
    SetMain { hash: Hash, is_main: bool },
    /// Mark transactions confirmed at `height`.
    ConfirmTxs { height: i32, tx_hashes: Vec<Hash> },
    /// Mark every transaction confirmed at or above `height` unconfirmed.
    UnconfirmFrom { height: i32 },
}

/// Persistent block storage.
///
/// Reads are keyed by hash and by main-chain height. All mutators are
/// expressed as [`StoreOp`] batches; the provided single-operation methods
/// are one-element batches.
pub trait BlockStore: Send + Sync {
    /// Highest main-chain block.
    fn get_tip(&self) -> Result<Option<Block>, StoreError>;

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StoreError>;

    /// Main-chain block whose parent is `prev_hash`.
    fn get_main_chain_block(&self, prev_hash: &Hash) -> Result<Option<Block>, StoreError>;

    /// Main-chain block at `height`.
    fn get_main_block_at(&self, height: i32) -> Result<Option<Block>, StoreError>;

    /// Side-branch block whose parent is `prev_hash`.
    fn get_orphan_block(&self, prev_hash: &Hash) -> Result<Option<Block>, StoreError>;

    /// Main-chain blocks from `height` upward, ascending.
    fn get_blocks_from(&self, height: i32) -> Result<Vec<Block>, StoreError>;

    /// Height a transaction is confirmed at, if any.
    fn tx_confirmation(&self, tx_hash: &Hash) -> Result<Option<i32>, StoreError>;

    fn block_count(&self) -> Result<usize, StoreError>;

    /// Drop side-branch blocks below `height`. Returns how many were removed.
    fn clean_old_orphans(&mut self, height: i32) -> Result<usize, StoreError>;

    /// Apply every operation or none of them.
    fn commit(&mut self, ops: Vec<StoreOp>) -> Result<(), StoreError>;

    fn add_blocks(&mut self, blocks: Vec<Block>) -> Result<(), StoreError> {
        self.commit(blocks.into_iter().map(StoreOp::Add).collect())
    }

    fn remove_block(&mut self, hash: &Hash) -> Result<(), StoreError> {
        self.commit(vec![StoreOp::Remove(*hash)])
    }

    fn update_block_main_flag(&mut self, hash: &Hash, is_main: bool) -> Result<(), StoreError> {
        self.commit(vec![StoreOp::SetMain {
            hash: *hash,
            is_main,
        }])
    }

    fn confirm_txs(&mut self, height: i32, tx_hashes: Vec<Hash>) -> Result<(), StoreError> {
        self.commit(vec![StoreOp::ConfirmTxs { height, tx_hashes }])
    }

    fn unconfirm_txs_from(&mut self, height: i32) -> Result<(), StoreError> {
        self.commit(vec![StoreOp::UnconfirmFrom { height }])
    }
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Seconds since the unix epoch.
    fn now(&self) -> u64;
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct FixedTimeSource(AtomicU64);

impl FixedTimeSource {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// In-memory adapter
// =============================================================================

#[derive(Debug, Clone, Default)]
struct StoreState {
    blocks: HashMap<Hash, Block>,
    main_by_height: BTreeMap<i32, Hash>,
    confirmations: HashMap<Hash, i32>,
}

impl StoreState {
    fn apply(&mut self, op: StoreOp) -> Result<(), StoreError> {
        match op {
            StoreOp::Add(block) => {
                let hash = block.hash();
                if block.header.is_main {
                    self.main_by_height.insert(block.height(), hash);
                }
                self.blocks.insert(hash, block);
            }
            StoreOp::Remove(hash) => {
                let block = self
                    .blocks
                    .remove(&hash)
                    .ok_or_else(|| StoreError::NotFound(hash_to_hex(&hash)))?;
                if self.main_by_height.get(&block.height()) == Some(&hash) {
                    self.main_by_height.remove(&block.height());
                }
            }
            StoreOp::SetMain { hash, is_main } => {
                let block = self
                    .blocks
                    .get_mut(&hash)
                    .ok_or_else(|| StoreError::NotFound(hash_to_hex(&hash)))?;
                block.header.is_main = is_main;
                let height = block.height();
                if is_main {
                    self.main_by_height.insert(height, hash);
                } else if self.main_by_height.get(&height) == Some(&hash) {
                    self.main_by_height.remove(&height);
                }
            }
            StoreOp::ConfirmTxs { height, tx_hashes } => {
                for tx in tx_hashes {
                    self.confirmations.insert(tx, height);
                }
            }
            StoreOp::UnconfirmFrom { height } => {
                self.confirmations.retain(|_, h| *h < height);
            }
        }
        Ok(())
    }

    fn main_at(&self, height: i32) -> Option<&Block> {
        self.main_by_height
            .get(&height)
            .and_then(|hash| self.blocks.get(hash))
    }
}

/// In-memory block store.
///
/// `commit` stages the batch on a copy and swaps it in only if every
/// operation succeeds.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    state: StoreState,
    fail_next_commit: bool,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail without applying anything.
    pub fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    /// Main-chain hashes from genesis to tip.
    pub fn main_chain(&self) -> Vec<Hash> {
        self.state.main_by_height.values().copied().collect()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn get_tip(&self) -> Result<Option<Block>, StoreError> {
        Ok(self
            .state
            .main_by_height
            .values()
            .next_back()
            .and_then(|hash| self.state.blocks.get(hash))
            .cloned())
    }

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        Ok(self.state.blocks.get(hash).cloned())
    }

    fn get_main_chain_block(&self, prev_hash: &Hash) -> Result<Option<Block>, StoreError> {
        let Some(parent) = self.state.blocks.get(prev_hash) else {
            return Ok(None);
        };
        Ok(self
            .state
            .main_at(parent.height() + 1)
            .filter(|b| b.header.prev_hash() == *prev_hash)
            .cloned())
    }

    fn get_main_block_at(&self, height: i32) -> Result<Option<Block>, StoreError> {
        Ok(self.state.main_at(height).cloned())
    }

    fn get_orphan_block(&self, prev_hash: &Hash) -> Result<Option<Block>, StoreError> {
        Ok(self
            .state
            .blocks
            .values()
            .find(|b| !b.header.is_main && b.header.prev_hash() == *prev_hash)
            .cloned())
    }

    fn get_blocks_from(&self, height: i32) -> Result<Vec<Block>, StoreError> {
        Ok(self
            .state
            .main_by_height
            .range(height..)
            .filter_map(|(_, hash)| self.state.blocks.get(hash).cloned())
            .collect())
    }

    fn tx_confirmation(&self, tx_hash: &Hash) -> Result<Option<i32>, StoreError> {
        Ok(self.state.confirmations.get(tx_hash).copied())
    }

    fn block_count(&self) -> Result<usize, StoreError> {
        Ok(self.state.blocks.len())
    }

    fn clean_old_orphans(&mut self, height: i32) -> Result<usize, StoreError> {
        let before = self.state.blocks.len();
        self.state
            .blocks
            .retain(|_, b| b.header.is_main || b.height() >= height);
        Ok(before - self.state.blocks.len())
    }

    fn commit(&mut self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        if std::mem::take(&mut self.fail_next_commit) {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }
        let mut staged = self.state.clone();
        for op in ops {
            staged.apply(op)?;
        }
        self.state = staged;
        Ok(())
    }
}
