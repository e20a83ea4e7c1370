//! # Events and Commands
//!
//! What sessions report to the pool, what the pool tells sessions, and what
//! the pool broadcasts to the wallet.

use shared_types::{Block, BlockHeader, Hash, Transaction};
use spv_bloom_filters::BloomFilter;

use super::peer::{DisconnectReason, PeerInfo};

/// Session → pool.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerEvent {
    /// Handshake finished in both directions.
    Connected(PeerInfo),
    /// Smoothed round-trip time after a `pong`.
    PingMeasured(f64),
    Headers(Vec<BlockHeader>),
    /// A filtered block with all matched transactions accounted for.
    Block(Block),
    /// Blocks buffered during sync, in arrival order.
    BlockBatch(Vec<Block>),
    /// A relevant transaction, relayed or matched in a block.
    Transaction(Transaction),
    /// The peer asked for transactions by hash.
    TxRequested(Vec<Hash>),
    /// Invalid block data; the pool abandons the peer.
    Misbehaved(String),
    Disconnected(DisconnectReason),
}

/// Pool → session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    /// Install a filter, deferred while a filtered block is in flight.
    LoadFilter(BloomFilter),
    /// Begin catch-up from `locator`.
    StartSync {
        local_height: i32,
        locator: Vec<Hash>,
        headers_only: bool,
    },
    /// Flush buffered blocks and leave sync mode.
    EndSync,
    RequestHeaders {
        locator: Vec<Hash>,
        stop: Hash,
    },
    RequestBlocks {
        locator: Vec<Hash>,
        stop: Hash,
    },
    AnnounceTx(Vec<Hash>),
    SendTx(Transaction),
    SendNotFound(Vec<Hash>),
    Disconnect(DisconnectReason),
}

/// Pool → wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolNotification {
    ChainChanged { height: i32, hash: Hash },
    TxSeen { hash: Hash, peers: usize },
    SyncStarted { from: i32, to: i32 },
    SyncCompleted { height: i32 },
    SyncFailed { failures: u32 },
    PeerCountChanged { connected: usize },
}
