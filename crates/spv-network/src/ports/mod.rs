//! # Ports Layer
//!
//! Inbound (API) and outbound (dependency) traits.

pub mod inbound;
pub mod outbound;

pub use inbound::{PeerPoolApi, PoolStatus};
pub use outbound::{
    InMemoryPeerAddressStore, InMemoryWallet, MockConnector, MockWatchdog, PeerAddressStore,
    PeerConnector, PeerLink, WalletGateway, WatchdogScheduler,
};
