//! # Inbound Ports
//!
//! What the peer pool offers. Every method runs on the sequencer worker.

use shared_types::{Hash, Transaction};

use crate::domain::{PeerEvent, PeerId};
use crate::error::PublishError;

/// Snapshot of the pool for callers outside the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStatus {
    pub running: bool,
    pub synchronizing: bool,
    pub sync_failed: bool,
    pub height: i32,
    pub tip: Hash,
    pub connected_peers: usize,
    pub download_peer: Option<PeerId>,
    pub published: usize,
}

/// Peer pool API - inbound port.
pub trait PeerPoolApi {
    /// Allow connections and fill the pool.
    fn start(&mut self);

    /// Disconnect every peer and stop reconnecting.
    fn stop(&mut self);

    /// Register and announce a fully signed transaction.
    fn publish(&mut self, tx: Transaction) -> Result<(), PublishError>;

    /// Apply one event reported by a session.
    fn handle_peer_event(&mut self, peer: PeerId, event: PeerEvent);

    /// The watched address/output set changed.
    fn wallet_changed(&mut self);

    /// The sync watchdog armed as `generation` expired.
    fn watchdog_fired(&mut self, generation: u64);

    fn status(&self) -> PoolStatus;
}
