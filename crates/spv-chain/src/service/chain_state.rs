//! # Chain State
//!
//! Owns the best-chain tip and the orphan pool, and decides how every
//! incoming header or block connects.
//!
//! Reorganizations stage the demotion of the old branch and the promotion of
//! the new one and commit both in a single store batch: the chain is either
//! fully pre-reorg or fully post-reorg.

use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{hash_to_hex, Block, BlockHeader, Hash};
use tracing::{debug, info, warn};

use crate::config::ChainParams;
use crate::domain::{
    check_proof_of_work, decode_compact, encode_compact, locator_heights, next_target,
    target_matches, ChainError, ConsensusError,
};
use crate::ports::{
    BlockStore, ChainStateApi, HeaderBatchOutcome, StoreOp, SystemTimeSource, TimeSource,
};

/// Locally trusted best chain.
pub struct ChainState<S: BlockStore> {
    params: ChainParams,
    store: S,
    clock: Arc<dyn TimeSource>,
    tip: BlockHeader,
    best_orphan: Option<BlockHeader>,
    /// Blocks keyed by the parent they wait on.
    orphan_pool: HashMap<Hash, Block>,
    /// Headers that broke a header batch, keyed by their own hash.
    header_orphans: HashMap<Hash, BlockHeader>,
}

impl<S: BlockStore> ChainState<S> {
    /// Load the tip from `store`, seeding it with genesis when empty.
    pub fn new(params: ChainParams, store: S) -> Result<Self, ChainError> {
        Self::with_clock(params, store, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(
        params: ChainParams,
        mut store: S,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ChainError> {
        let tip = match store.get_tip()? {
            Some(block) => block.header,
            None => {
                let genesis = params.genesis.clone().connected(0, true);
                store.add_blocks(vec![Block::header_only(genesis.clone())])?;
                info!(
                    network = ?params.network,
                    hash = %hash_to_hex(&genesis.hash()),
                    "Seeded block store with genesis"
                );
                genesis
            }
        };
        info!(height = tip.height, hash = %hash_to_hex(&tip.hash()), "Chain state loaded");

        Ok(Self {
            params,
            store,
            clock,
            tip,
            best_orphan: None,
            orphan_pool: HashMap::new(),
            header_orphans: HashMap::new(),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Most recent orphan seen, if any are pending.
    pub fn best_orphan(&self) -> Option<&BlockHeader> {
        self.best_orphan.as_ref()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphan_pool.len() + self.header_orphans.len()
    }

    /// Whether `hash` is held as an orphan block or orphan header.
    pub fn is_orphan(&self, hash: &Hash) -> bool {
        self.header_orphans.contains_key(hash)
            || self.orphan_pool.values().any(|b| b.hash() == *hash)
    }

    /// Whether the store holds `hash`, on any branch.
    pub fn contains_block(&self, hash: &Hash) -> Result<bool, ChainError> {
        Ok(self.store.get_block(hash)?.is_some())
    }

    /// Remove and return the orphan block waiting on parent `hash`.
    pub fn take_orphan_waiting_on(&mut self, hash: &Hash) -> Option<Block> {
        let orphan = self.orphan_pool.remove(hash)?;
        if self.best_orphan.as_ref().map(|b| b.hash()) == Some(orphan.hash()) {
            self.refresh_best_orphan();
        }
        Some(orphan)
    }

    /// Remove and return the orphan header with hash `hash`.
    pub fn take_orphan_header(&mut self, hash: &Hash) -> Option<BlockHeader> {
        let header = self.header_orphans.remove(hash)?;
        if self.best_orphan.as_ref().map(|b| b.hash()) == Some(*hash) {
            self.refresh_best_orphan();
        }
        Some(header)
    }

    /// Drop every in-memory orphan and stale side-branch blocks from the store.
    pub fn prune_orphans(&mut self) -> Result<usize, ChainError> {
        let in_memory = self.orphan_count();
        self.orphan_pool.clear();
        self.header_orphans.clear();
        self.best_orphan = None;
        let stored = self
            .store
            .clean_old_orphans(self.tip.height - self.params.difficulty_interval)?;
        debug!(in_memory, stored, "Pruned orphans");
        Ok(in_memory + stored)
    }

    fn refresh_best_orphan(&mut self) {
        self.best_orphan = self
            .orphan_pool
            .values()
            .map(|b| &b.header)
            .chain(self.header_orphans.values())
            .max_by_key(|h| h.timestamp())
            .cloned();
    }

    fn note_orphan(&mut self, header: &BlockHeader) {
        let newer = self
            .best_orphan
            .as_ref()
            .map_or(true, |best| header.timestamp() >= best.timestamp());
        if newer {
            self.best_orphan = Some(header.clone());
        }
    }

    fn add_header_orphan(&mut self, header: BlockHeader) {
        self.note_orphan(&header);
        let hash = header.hash();
        debug!(
            hash = %hash_to_hex(&hash),
            waiting_on = %hash_to_hex(&header.prev_hash()),
            "Orphan header stored"
        );
        self.header_orphans.insert(hash, header);
    }

    fn add_orphan(&mut self, key: Hash, block: Block) {
        self.note_orphan(&block.header);
        debug!(
            hash = %hash_to_hex(&block.hash()),
            waiting_on = %hash_to_hex(&key),
            pool = self.orphan_pool.len() + 1,
            "Orphan block stored"
        );
        self.orphan_pool.insert(key, block);
    }

    /// Header `height` levels at or below `from`, following parent links.
    fn ancestor_at(&self, from: &BlockHeader, height: i32) -> Result<BlockHeader, ChainError> {
        let mut cursor = from.clone();
        while cursor.height > height {
            if cursor.is_main {
                return self
                    .store
                    .get_main_block_at(height)?
                    .map(|b| b.header)
                    .ok_or_else(|| ChainError::MissingAncestor {
                        hash: format!("main chain height {height}"),
                    });
            }
            let prev = cursor.prev_hash();
            cursor = self
                .store
                .get_block(&prev)?
                .map(|b| b.header)
                .ok_or_else(|| ChainError::MissingAncestor {
                    hash: hash_to_hex(&prev),
                })?;
        }
        Ok(cursor)
    }

    fn extend_tip(&mut self, block: Block) -> Result<(), ChainError> {
        let mut header = block.header;
        header.is_main = true;
        let height = header.height;

        let mut ops = vec![StoreOp::Add(Block::new(header.clone(), block.tx_hashes.clone()))];
        if !block.tx_hashes.is_empty() {
            ops.push(StoreOp::ConfirmTxs {
                height,
                tx_hashes: block.tx_hashes,
            });
        }
        self.store.commit(ops)?;

        debug!(height, hash = %hash_to_hex(&header.hash()), "Chain extended");
        self.tip = header;
        Ok(())
    }

    /// Switch the main chain to the branch ending in `block`.
    fn reorganize(&mut self, block: Block) -> Result<(), ChainError> {
        let mut new_tip = block.header.clone();
        new_tip.is_main = true;

        // Newest first, down to (excluding) the fork point.
        let mut branch = vec![block];
        let mut cursor = self.parent_of(&branch[0].header)?;
        while !cursor.header.is_main {
            let parent = self.parent_of(&cursor.header)?;
            branch.push(cursor);
            cursor = parent;
        }
        let fork_height = cursor.height();
        if fork_height < self.params.checkpoint_height {
            return Err(ChainError::TooOld {
                height: fork_height + 1,
                checkpoint: self.params.checkpoint_height,
            });
        }

        let mut ops = Vec::new();
        let mut demoted = 0;
        for height in (fork_height + 1)..=self.tip.height {
            if let Some(old) = self.store.get_main_block_at(height)? {
                ops.push(StoreOp::SetMain {
                    hash: old.hash(),
                    is_main: false,
                });
                demoted += 1;
            }
        }
        ops.push(StoreOp::UnconfirmFrom {
            height: fork_height + 1,
        });

        let promoted = branch.len();
        for mut block in branch.into_iter().rev() {
            block.header.is_main = true;
            let hash = block.hash();
            let height = block.height();
            let tx_hashes = block.tx_hashes.clone();
            if self.store.get_block(&hash)?.is_some() {
                ops.push(StoreOp::SetMain {
                    hash,
                    is_main: true,
                });
            } else {
                ops.push(StoreOp::Add(block));
            }
            if !tx_hashes.is_empty() {
                ops.push(StoreOp::ConfirmTxs { height, tx_hashes });
            }
        }

        self.store.commit(ops)?;

        warn!(
            fork_height,
            old_tip = %hash_to_hex(&self.tip.hash()),
            new_tip = %hash_to_hex(&new_tip.hash()),
            demoted,
            promoted,
            "Chain reorganized"
        );
        self.tip = new_tip;
        Ok(())
    }

    fn parent_of(&self, header: &BlockHeader) -> Result<Block, ChainError> {
        let prev = header.prev_hash();
        self.store
            .get_block(&prev)?
            .ok_or_else(|| ChainError::MissingAncestor {
                hash: hash_to_hex(&prev),
            })
    }
}

impl<S: BlockStore> ChainStateApi for ChainState<S> {
    fn accept_header_batch(&mut self, headers: Vec<BlockHeader>) -> Result<usize, ChainError> {
        Ok(self.accept_headers(headers)?.accepted)
    }

    fn accept_headers(
        &mut self,
        headers: Vec<BlockHeader>,
    ) -> Result<HeaderBatchOutcome, ChainError> {
        let mut outcome = HeaderBatchOutcome::default();
        let total = headers.len();
        // The first header may attach anywhere we know; the rest must chain.
        let mut expected_prev: Option<Hash> = None;

        for header in headers {
            let hash = header.hash();
            let links = match expected_prev {
                Some(prev) => header.prev_hash() == prev,
                None => self.store.get_block(&header.prev_hash())?.is_some(),
            };
            if !links {
                if self.store.get_block(&hash)?.is_some() {
                    outcome.skipped += 1;
                    expected_prev = Some(hash);
                    continue;
                }
                check_proof_of_work(&header, self.params.max_target(), self.clock.now())?;
                self.add_header_orphan(header);
                outcome.orphaned = Some(hash);
                break;
            }
            if outcome.accepted == 0 && self.store.get_block(&hash)?.is_some() {
                outcome.skipped += 1;
                expected_prev = Some(hash);
                continue;
            }
            self.accept_block(Block::header_only(header))?;
            outcome.accepted += 1;
            expected_prev = Some(hash);
        }

        info!(
            total,
            accepted = outcome.accepted,
            skipped = outcome.skipped,
            orphaned = outcome.orphaned.is_some(),
            height = self.tip.height,
            "Header batch processed"
        );
        Ok(outcome)
    }

    fn accept_block(&mut self, block: Block) -> Result<bool, ChainError> {
        check_proof_of_work(&block.header, self.params.max_target(), self.clock.now())?;

        let hash = block.hash();
        let Block { header, tx_hashes } = block;

        let Some(parent) = self.store.get_block(&header.prev_hash())? else {
            let waiting_on = header.prev_hash();
            self.add_orphan(waiting_on, Block::new(header, tx_hashes));
            return Ok(false);
        };

        let height = parent.height() + 1;
        let header = header.connected(height, false);
        self.verify_difficulty(&header, &parent.header)?;
        // A parked header with this hash is now connected.
        self.take_orphan_header(&hash);

        if header.prev_hash() == self.tip.hash() {
            self.extend_tip(Block::new(header, tx_hashes))?;
            return Ok(true);
        }

        if height <= self.tip.height {
            if let Some(existing) = self.store.get_main_block_at(height)? {
                if existing.hash() == hash {
                    return Ok(true);
                }
            }
            if height <= self.params.checkpoint_height {
                return Err(ChainError::TooOld {
                    height,
                    checkpoint: self.params.checkpoint_height,
                });
            }
            if self.store.get_block(&hash)?.is_none() {
                self.store.add_blocks(vec![Block::new(header, tx_hashes)])?;
                debug!(height, hash = %hash_to_hex(&hash), "Side-branch block stored");
            }
            return Ok(false);
        }

        self.reorganize(Block::new(header, tx_hashes))?;
        Ok(true)
    }

    fn verify_difficulty(
        &self,
        candidate: &BlockHeader,
        parent: &BlockHeader,
    ) -> Result<(), ChainError> {
        let height = parent.height + 1;

        if !self.params.is_retarget_height(height) {
            if candidate.bits() != parent.bits() {
                return Err(ConsensusError::DifficultyMismatch {
                    height,
                    expected: parent.bits(),
                    actual: candidate.bits(),
                }
                .into());
            }
            return Ok(());
        }

        let interval_start = parent.height - (self.params.difficulty_interval - 1);
        let first = self.ancestor_at(parent, interval_start)?;
        let timespan = i64::from(parent.timestamp()) - i64::from(first.timestamp());
        let parent_target = decode_compact(parent.bits())
            .ok_or(ConsensusError::TargetOutOfRange { bits: parent.bits() })?;
        let new_target = next_target(
            parent_target,
            timespan,
            self.params.target_timespan,
            self.params.max_target(),
        );

        if !target_matches(new_target, candidate.bits()) {
            return Err(ConsensusError::DifficultyMismatch {
                height,
                expected: encode_compact(new_target),
                actual: candidate.bits(),
            }
            .into());
        }
        debug!(height, timespan, bits = candidate.bits(), "Difficulty transition verified");
        Ok(())
    }

    fn block_locator(&self) -> Result<Vec<Hash>, ChainError> {
        let mut hashes = Vec::new();
        for height in locator_heights(self.tip.height) {
            if let Some(block) = self.store.get_main_block_at(height)? {
                hashes.push(block.hash());
            }
        }
        hashes.push(self.params.genesis_hash());
        Ok(hashes)
    }

    fn rollback_to(&mut self, height: i32) -> Result<(), ChainError> {
        let tip = self.tip.height;
        let refuse = |reason: &str| ChainError::RollbackRefused {
            target: height,
            tip,
            reason: reason.to_string(),
        };

        if height > tip {
            return Err(refuse("target above tip"));
        }
        if height < 0 {
            return Err(refuse("negative height"));
        }
        let distance = tip - height;
        if distance >= self.params.difficulty_interval {
            return Err(refuse("distance reaches the difficulty interval"));
        }
        if distance as usize >= self.store.block_count()? {
            return Err(refuse("distance reaches the stored block count"));
        }
        if distance == 0 {
            return Ok(());
        }

        let new_tip = self
            .store
            .get_main_block_at(height)?
            .ok_or_else(|| ChainError::MissingAncestor {
                hash: format!("main chain height {height}"),
            })?;

        let mut ops = Vec::with_capacity(distance as usize + 1);
        for h in (height + 1)..=tip {
            if let Some(block) = self.store.get_main_block_at(h)? {
                ops.push(StoreOp::Remove(block.hash()));
            }
        }
        ops.push(StoreOp::UnconfirmFrom { height: height + 1 });
        self.store.commit(ops)?;

        warn!(from = tip, to = height, "Chain rolled back");
        self.tip = new_tip.header;
        Ok(())
    }

    fn tip(&self) -> &BlockHeader {
        &self.tip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedTimeSource, InMemoryBlockStore};
    use crate::test_utils::{
        build_headers, child_block, child_header, mine, test_chain_state, test_chain_state_with,
    };

    type TestChain = ChainState<InMemoryBlockStore>;

    fn extend(chain: &mut TestChain, count: usize) -> Vec<BlockHeader> {
        let headers = build_headers(chain.tip(), count, 0);
        assert_eq!(chain.accept_header_batch(headers.clone()).unwrap(), count);
        headers
    }

    #[test]
    fn test_new_seeds_genesis() {
        let chain = test_chain_state();
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.tip().hash(), chain.params().genesis_hash());
        assert_eq!(chain.store().block_count().unwrap(), 1);
    }

    #[test]
    fn test_reload_uses_stored_tip() {
        let mut chain = test_chain_state();
        extend(&mut chain, 3);
        let tip = chain.tip().hash();

        let ChainState { store, params, .. } = chain;
        let reloaded = ChainState::new(params, store).unwrap();
        assert_eq!(reloaded.tip().hash(), tip);
        assert_eq!(reloaded.height(), 3);
    }

    #[test]
    fn test_genesis_plus_block_one() {
        let mut chain = test_chain_state();
        let block1 = child_block(chain.tip(), vec![[1; 32], [2; 32]]);
        let hash = block1.hash();

        assert!(chain.accept_block(block1).unwrap());
        assert_eq!(chain.tip().hash(), hash);
        assert_eq!(chain.height(), 1);
        assert!(chain.tip().is_main);
        assert_eq!(chain.store().tx_confirmation(&[1; 32]).unwrap(), Some(1));
    }

    #[test]
    fn test_duplicate_block_is_accepted() {
        let mut chain = test_chain_state();
        let headers = extend(&mut chain, 3);
        assert!(chain.accept_block(Block::header_only(headers[1].clone())).unwrap());
        assert_eq!(chain.height(), 3);
    }

    #[test]
    fn test_unknown_parent_is_orphaned() {
        let mut chain = test_chain_state();
        let headers = build_headers(chain.tip(), 3, 0);
        let tip_before = chain.tip().clone();

        let orphan = Block::header_only(headers[2].clone());
        assert!(!chain.accept_block(orphan).unwrap());
        assert_eq!(chain.tip(), &tip_before);
        assert_eq!(chain.orphan_count(), 1);
        assert_eq!(chain.best_orphan().unwrap().hash(), headers[2].hash());

        let waiting = chain.take_orphan_waiting_on(&headers[1].hash()).unwrap();
        assert_eq!(waiting.hash(), headers[2].hash());
        assert!(chain.best_orphan().is_none());
        assert_eq!(chain.orphan_count(), 0);
    }

    #[test]
    fn test_header_batch_partial_commit() {
        let mut chain = test_chain_state();
        let headers = build_headers(chain.tip(), 3, 0);
        assert_eq!(chain.accept_header_batch(headers.clone()).unwrap(), 3);

        // Mismatched fourth header: its parent is not header 3.
        let stray_parent = build_headers(&headers[0], 1, 7).remove(0);
        let stray = child_header(&stray_parent, [9; 32]);
        let mut batch = build_headers(chain.tip(), 3, 1);
        let expected_tip = batch[2].hash();
        batch.push(stray.clone());

        let outcome = chain.accept_headers(batch).unwrap();
        assert_eq!(outcome.accepted, 3);
        assert_eq!(outcome.orphaned, Some(stray.hash()));
        assert_eq!(chain.tip().hash(), expected_tip);
        assert!(chain.is_orphan(&stray.hash()));
        assert!(chain.take_orphan_header(&stray.hash()).is_some());
        assert_eq!(chain.orphan_count(), 0);
    }

    #[test]
    fn test_header_batch_requires_each_header_to_link_to_the_previous() {
        let mut chain = test_chain_state();
        let headers = build_headers(chain.tip(), 3, 0);
        // Valid on its own: it extends header 1, not header 3.
        let fork = child_header(&headers[0], [9; 32]);
        let mut batch = headers.clone();
        batch.push(fork.clone());

        let outcome = chain.accept_headers(batch).unwrap();
        assert_eq!(outcome.accepted, 3);
        assert_eq!(outcome.orphaned, Some(fork.hash()));
        assert!(!outcome.is_complete(4));
        assert_eq!(chain.tip().hash(), headers[2].hash());
        assert!(chain.is_orphan(&fork.hash()));
        assert!(chain.store().get_block(&fork.hash()).unwrap().is_none());
    }

    #[test]
    fn test_orphan_header_is_not_released_as_waiting_block() {
        let mut chain = test_chain_state();
        let headers = build_headers(chain.tip(), 2, 0);

        // Header 2 arrives alone and is parked under its own hash.
        let outcome = chain.accept_headers(vec![headers[1].clone()]).unwrap();
        assert_eq!(outcome.orphaned, Some(headers[1].hash()));

        assert!(chain.accept_block(Block::header_only(headers[0].clone())).unwrap());
        assert!(chain.take_orphan_waiting_on(&headers[0].hash()).is_none());
        assert!(chain.accept_block(Block::header_only(headers[1].clone())).unwrap());
        assert!(chain.take_orphan_waiting_on(&headers[1].hash()).is_none());
        assert!(!chain.is_orphan(&headers[1].hash()));
        assert_eq!(chain.orphan_count(), 0);
        assert_eq!(chain.height(), 2);
    }

    #[test]
    fn test_header_batch_skips_known_prefix() {
        let mut chain = test_chain_state();
        let first = extend(&mut chain, 4);
        let more = build_headers(chain.tip(), 2, 0);

        let mut batch = first[2..].to_vec();
        batch.extend(more.clone());
        let outcome = chain.accept_headers(batch).unwrap();
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.accepted, 2);
        assert!(outcome.is_complete(4));
        assert_eq!(chain.tip().hash(), more[1].hash());
    }

    #[test]
    fn test_header_batch_stops_on_bad_difficulty() {
        let mut chain = test_chain_state();
        let mut headers = build_headers(chain.tip(), 3, 0);
        let mut bad = headers[1].clone();
        bad.set_bits(0x1f7fffff);
        mine(&mut bad);
        headers[1] = bad;

        let err = chain.accept_header_batch(headers).unwrap_err();
        assert!(matches!(
            err,
            ChainError::Consensus(ConsensusError::DifficultyMismatch { height: 2, .. })
        ));
        // Prefix stays committed.
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_non_boundary_bits_must_match_parent() {
        let chain = test_chain_state();
        let parent = chain.tip().clone();
        let mut candidate = child_header(&parent, [0; 32]);
        candidate.set_bits(parent.bits() - 1);
        assert!(matches!(
            chain.verify_difficulty(&candidate, &parent),
            Err(ChainError::Consensus(ConsensusError::DifficultyMismatch { .. }))
        ));
    }

    #[test]
    fn test_retarget_boundary() {
        // Blocks every 600s over a 6000s target: the boundary tightens.
        let mut chain = test_chain_state();
        let mut parent = chain.tip().clone();
        for i in 1..10 {
            let mut header = BlockHeader::new(
                1,
                parent.hash(),
                [i as u8; 32],
                parent.timestamp() + 600,
                parent.bits(),
                0,
            );
            mine(&mut header);
            assert!(chain.accept_block(Block::header_only(header.clone())).unwrap());
            parent = chain.tip().clone();
        }
        assert_eq!(chain.height(), 9);

        let max = chain.params().max_target();
        let expected = encode_compact(next_target(max, 9 * 600, 6000, max));
        assert_ne!(expected, parent.bits());

        let next_time = parent.timestamp() + 600;
        let mut stale = BlockHeader::new(1, parent.hash(), [10; 32], next_time, parent.bits(), 0);
        mine(&mut stale);
        assert!(matches!(
            chain.verify_difficulty(&stale.clone().connected(10, false), &parent),
            Err(ChainError::Consensus(ConsensusError::DifficultyMismatch {
                height: 10,
                ..
            }))
        ));

        let mut retargeted = BlockHeader::new(1, parent.hash(), [10; 32], next_time, expected, 0);
        mine(&mut retargeted);
        assert!(chain.accept_block(Block::header_only(retargeted)).unwrap());
        assert_eq!(chain.height(), 10);
    }

    #[test]
    fn test_side_branch_then_reorg() {
        let mut chain = test_chain_state();
        let genesis = chain.tip().clone();
        let main = build_headers(&genesis, 3, 0);
        let main_blocks: Vec<Block> = main
            .iter()
            .enumerate()
            .map(|(i, h)| Block::new(h.clone(), vec![[i as u8 + 1; 32]]))
            .collect();
        for block in &main_blocks {
            assert!(chain.accept_block(block.clone()).unwrap());
        }

        // Competing branch forking after block 1.
        let fork = build_headers(&main[0], 3, 9);
        assert!(!chain.accept_block(Block::new(fork[0].clone(), vec![[0xa1; 32]])).unwrap());
        assert!(!chain.accept_block(Block::header_only(fork[1].clone())).unwrap());
        assert_eq!(chain.tip().hash(), main[2].hash());

        // Height 4 > tip: the fork wins.
        assert!(chain.accept_block(Block::header_only(fork[2].clone())).unwrap());
        assert_eq!(chain.tip().hash(), fork[2].hash());
        assert_eq!(chain.height(), 4);

        let store = chain.store();
        assert!(!store.get_block(&main[1].hash()).unwrap().unwrap().header.is_main);
        assert!(store.get_block(&fork[0].hash()).unwrap().unwrap().header.is_main);
        assert_eq!(store.get_main_block_at(1).unwrap().unwrap().hash(), main[0].hash());
        // Block 1 stays confirmed, the replaced blocks do not.
        assert_eq!(store.tx_confirmation(&[1; 32]).unwrap(), Some(1));
        assert_eq!(store.tx_confirmation(&[2; 32]).unwrap(), None);
        assert_eq!(store.tx_confirmation(&[0xa1; 32]).unwrap(), Some(2));
    }

    #[test]
    fn test_reorg_is_atomic_on_store_failure() {
        let mut chain = test_chain_state();
        let genesis = chain.tip().clone();
        let main = build_headers(&genesis, 2, 0);
        chain.accept_header_batch(main.clone()).unwrap();
        let fork = build_headers(&genesis, 3, 5);
        chain.accept_header_batch(fork[..2].to_vec()).unwrap();

        chain.store_mut().fail_next_commit();
        let err = chain.accept_block(Block::header_only(fork[2].clone())).unwrap_err();
        assert!(matches!(err, ChainError::Store(_)));

        assert_eq!(chain.tip().hash(), main[1].hash());
        let store = chain.store();
        assert!(store.get_block(&main[1].hash()).unwrap().unwrap().header.is_main);
        assert!(!store.get_block(&fork[1].hash()).unwrap().unwrap().header.is_main);

        // Retrying without the fault completes the reorg.
        assert!(chain.accept_block(Block::header_only(fork[2].clone())).unwrap());
        assert_eq!(chain.tip().hash(), fork[2].hash());
    }

    #[test]
    fn test_competing_block_below_checkpoint_too_old() {
        let params = ChainParams {
            checkpoint_height: 3,
            ..ChainParams::for_testing()
        };
        let mut chain = test_chain_state_with(params);
        let main = extend(&mut chain, 5);
        let competing = child_header(&main[0], [0x42; 32]);
        assert!(matches!(
            chain.accept_block(Block::header_only(competing)),
            Err(ChainError::TooOld { height: 2, checkpoint: 3 })
        ));
    }

    #[test]
    fn test_block_locator() {
        let mut chain = test_chain_state();
        assert_eq!(chain.block_locator().unwrap(), vec![chain.params().genesis_hash()]);

        let headers = extend(&mut chain, 30);
        let locator = chain.block_locator().unwrap();
        assert_eq!(locator[0], headers[29].hash());
        assert_eq!(locator[9], headers[20].hash());
        // Heights 30..21, then 19, 15, 7.
        assert_eq!(locator[10], headers[18].hash());
        assert_eq!(locator.len(), 14);
        assert_eq!(*locator.last().unwrap(), chain.params().genesis_hash());
    }

    #[test]
    fn test_rollback_to() {
        let mut chain = test_chain_state();
        let txs: Vec<Hash> = (0..5).map(|i| [i as u8 + 1; 32]).collect();
        for tx in &txs {
            let block = child_block(chain.tip(), vec![*tx]);
            chain.accept_block(block).unwrap();
        }
        assert_eq!(chain.height(), 5);

        chain.rollback_to(3).unwrap();
        assert_eq!(chain.height(), 3);
        assert_eq!(chain.store().block_count().unwrap(), 4);
        assert_eq!(chain.store().tx_confirmation(&txs[2]).unwrap(), Some(3));
        assert_eq!(chain.store().tx_confirmation(&txs[3]).unwrap(), None);

        chain.rollback_to(0).unwrap();
        assert_eq!(chain.tip().hash(), chain.params().genesis_hash());
    }

    #[test]
    fn test_rollback_refusals() {
        let mut chain = test_chain_state();
        extend(&mut chain, 12);
        let tip = chain.tip().hash();

        for target in [13, 2, -1] {
            assert!(matches!(
                chain.rollback_to(target),
                Err(ChainError::RollbackRefused { .. })
            ));
        }
        assert_eq!(chain.tip().hash(), tip);
        assert_eq!(chain.store().block_count().unwrap(), 13);
    }

    #[test]
    fn test_rollback_refused_beyond_stored_blocks() {
        // Store starting from a trusted block at height 100 instead of genesis.
        let genesis = ChainParams::for_testing().genesis;
        let start = build_headers(&genesis, 1, 3).remove(0).connected(100, true);
        let mut store = InMemoryBlockStore::new();
        store.add_blocks(vec![Block::header_only(start.clone())]).unwrap();

        let mut chain = ChainState::new(ChainParams::for_testing(), store).unwrap();
        assert_eq!(chain.height(), 100);
        chain.accept_header_batch(build_headers(&start, 3, 0)).unwrap();
        assert_eq!(chain.height(), 103);

        assert!(matches!(
            chain.rollback_to(97),
            Err(ChainError::RollbackRefused { .. })
        ));
        assert!(chain.rollback_to(101).is_ok());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let clock = Arc::new(FixedTimeSource::new(0));
        let params = ChainParams::for_testing();
        let mut chain =
            ChainState::with_clock(params, InMemoryBlockStore::new(), clock.clone()).unwrap();
        let block = child_block(chain.tip(), vec![]);
        clock.set(u64::from(block.header.timestamp()) - 3 * 60 * 60);

        assert!(matches!(
            chain.accept_block(block),
            Err(ChainError::Consensus(ConsensusError::TimestampTooFarInFuture { .. }))
        ));
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn test_prune_orphans() {
        let mut chain = test_chain_state();
        let headers = build_headers(chain.tip(), 4, 0);
        chain.accept_block(Block::header_only(headers[2].clone())).unwrap();
        chain.accept_block(Block::header_only(headers[3].clone())).unwrap();
        assert_eq!(chain.orphan_count(), 2);
        assert!(chain.is_orphan(&headers[3].hash()));

        assert_eq!(chain.prune_orphans().unwrap(), 2);
        assert_eq!(chain.orphan_count(), 0);
        assert!(chain.best_orphan().is_none());
    }
}
