//! Helpers for building mined regtest chains in tests.
//!
//! Headers are spaced 1000 seconds apart, slower than the regtest schedule,
//! so every retarget clamps to the maximum target and the bits never change.

use primitive_types::U256;
use shared_types::{Block, BlockHeader, Hash};

use crate::config::ChainParams;
use crate::domain::difficulty::{decode_compact, hash_to_u256};
use crate::domain::merkle_root;
use crate::ports::InMemoryBlockStore;
use crate::service::ChainState;

/// Seconds between consecutive test headers.
pub const TEST_BLOCK_SPACING: u32 = 1000;

/// Grind the nonce until the header satisfies its own target.
pub fn mine(header: &mut BlockHeader) {
    let target = decode_compact(header.bits()).unwrap_or(U256::MAX);
    while hash_to_u256(&header.hash()) > target {
        header.set_nonce(header.nonce().wrapping_add(1));
    }
}

/// Mined child of `parent` committing to `merkle_root`.
pub fn child_header(parent: &BlockHeader, merkle_root: Hash) -> BlockHeader {
    let mut header = BlockHeader::new(
        1,
        parent.hash(),
        merkle_root,
        parent.timestamp() + TEST_BLOCK_SPACING,
        parent.bits(),
        0,
    );
    mine(&mut header);
    header
}

/// `count` mined headers on top of `parent`. `salt` makes competing branches
/// distinct.
pub fn build_headers(parent: &BlockHeader, count: usize, salt: u8) -> Vec<BlockHeader> {
    let mut headers: Vec<BlockHeader> = Vec::with_capacity(count);
    for i in 0..count {
        let prev = headers.last().unwrap_or(parent);
        let mut root = [salt; 32];
        root[..8].copy_from_slice(&(i as u64).to_le_bytes());
        headers.push(child_header(prev, root));
    }
    headers
}

/// Mined child block of `parent` carrying `tx_hashes`.
pub fn child_block(parent: &BlockHeader, tx_hashes: Vec<Hash>) -> Block {
    let header = child_header(parent, merkle_root(&tx_hashes));
    Block::new(header, tx_hashes)
}

/// Fresh chain state on the short-interval regtest parameters.
pub fn test_chain_state() -> ChainState<InMemoryBlockStore> {
    test_chain_state_with(ChainParams::for_testing())
}

pub fn test_chain_state_with(params: ChainParams) -> ChainState<InMemoryBlockStore> {
    match ChainState::new(params, InMemoryBlockStore::new()) {
        Ok(chain) => chain,
        Err(e) => panic!("in-memory chain state failed to initialise: {e}"),
    }
}
