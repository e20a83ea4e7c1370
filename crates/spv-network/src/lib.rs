//! # SPV Network
//!
//! Bitcoin P2P plumbing for an SPV wallet: the wire codec, one state machine
//! per peer connection and the pool that elects a download peer, feeds the
//! header chain and relays wallet transactions.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Module Structure
//!
//! ```text
//! spv-network/
//! ├── domain/          # Messages, framing, peers, events, relay tracking
//! ├── ports/           # PeerPoolApi (inbound) + wallet, addresses, connector, timers
//! ├── service/         # Sequencer, PeerSession, PeerPool, PoolHandle
//! ├── adapters/        # TCP connector, tokio watchdog
//! ├── error.rs         # Protocol, pool and publish errors
//! └── config.rs        # Session and pool settings, TOML loading
//! ```
//!
//! ## Concurrency
//!
//! Each connection runs on its own task and talks to the pool only through
//! the bounded [`Sequencer`]. A single worker applies every [`PoolTask`] in
//! order, so pool and chain state are never touched concurrently.

#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{TcpConnector, TokioWatchdog};
pub use config::{ConfigError, PoolConfig, SessionConfig, SpvConfig};
pub use domain::{
    DisconnectReason, FrameCodec, Message, PeerEvent, PeerId, PeerInfo, PoolNotification,
    SessionCommand,
};
pub use error::{PoolError, ProtocolError, PublishError};
pub use ports::{
    InMemoryPeerAddressStore, InMemoryWallet, PeerAddressStore, PeerConnector, PeerLink,
    PeerPoolApi, PoolStatus, WalletGateway, WatchdogScheduler,
};
pub use service::{
    EventSink, PeerPool, PeerSession, PoolHandle, PoolPorts, PoolTask, Sequencer,
    HEADERS_ONLY_MARGIN_SECS,
};
