//! # Outbound Ports
//!
//! Traits for everything the pool and its sessions depend on: the wallet,
//! peer address persistence, connection setup and timers.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::{Hash, OutPoint, Transaction};
use spv_bloom_filters::{WatchList, WatchedAddress};
use tokio::sync::mpsc;

use crate::domain::{PeerId, SessionCommand};
use crate::service::EventSink;

/// Wallet collaborator - outbound port.
pub trait WalletGateway: Send + Sync {
    /// Whether `tx` pays to or spends from the wallet.
    fn is_relevant(&self, tx: &Transaction) -> bool;

    /// Whether `hash` is already persisted by the wallet.
    fn is_known(&self, hash: &Hash) -> bool;

    /// Whether `tx` double-spends an output the wallet already saw spent.
    fn conflicts(&self, tx: &Transaction) -> bool;

    /// Addresses and unspent outputs the connection filter must match.
    fn watch_list(&self) -> WatchList;

    /// Store a transaction we originated.
    fn register_published(&self, tx: &Transaction);

    /// Store a relayed transaction; `true` when it was new and relevant.
    fn register_relayed(&self, tx: &Transaction) -> bool;

    /// `peers` distinct peers have now relayed `hash`.
    fn mark_seen(&self, hash: &Hash, peers: usize);
}

/// Peer address persistence - outbound port.
pub trait PeerAddressStore: Send + Sync {
    fn get_peers(&self, limit: usize) -> Vec<SocketAddr>;

    fn add_peers(&self, peers: &[SocketAddr]);

    fn remove_peer(&self, address: &SocketAddr);
}

/// Command channel to one running session.
#[derive(Clone, Debug)]
pub struct PeerLink {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl PeerLink {
    pub fn new(commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { commands }
    }

    /// A link plus the receiving end for the session task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Never blocks; `false` when the session is gone.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Opens connections - outbound port.
///
/// The connection runs on its own task and reports through `sink`; failures
/// to connect arrive as a `Disconnected` event.
pub trait PeerConnector: Send + Sync {
    fn connect(
        &self,
        peer: PeerId,
        address: SocketAddr,
        local_height: i32,
        sink: EventSink,
    ) -> PeerLink;
}

/// Delayed sequencer tasks - outbound port.
pub trait WatchdogScheduler: Send + Sync {
    /// Submit `WatchdogFired { generation }` through `sink` after `after`.
    fn schedule(&self, generation: u64, after: Duration, sink: EventSink);
}

// =============================================================================
// In-memory adapters
// =============================================================================

#[derive(Default)]
struct WalletState {
    watch: WatchList,
    transactions: HashMap<Hash, Transaction>,
    /// Outpoint → spending wallet transaction.
    spent: HashMap<OutPoint, Hash>,
    published: Vec<Hash>,
    seen: HashMap<Hash, usize>,
}

/// Wallet matching pay-to-pubkey(-hash) outputs and watched outpoints.
#[derive(Default)]
pub struct InMemoryWallet {
    state: Mutex<WalletState>,
}

impl InMemoryWallet {
    pub fn new(watch: WatchList) -> Self {
        Self {
            state: Mutex::new(WalletState {
                watch,
                ..WalletState::default()
            }),
        }
    }

    pub fn add_address(&self, address: WatchedAddress) {
        self.state.lock().watch.addresses.push(address);
    }

    pub fn add_unspent(&self, outpoint: OutPoint) {
        self.state.lock().watch.unspent_outputs.push(outpoint);
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    pub fn published(&self) -> Vec<Hash> {
        self.state.lock().published.clone()
    }

    pub fn seen_count(&self, hash: &Hash) -> usize {
        self.state.lock().seen.get(hash).copied().unwrap_or(0)
    }

    fn relevant(state: &WalletState, tx: &Transaction) -> bool {
        let pays_us = tx.outputs.iter().any(|output| {
            state.watch.addresses.iter().any(|address| {
                contains(&output.script_pubkey, &address.public_key_hash)
                    || contains(&output.script_pubkey, &address.public_key)
            })
        });
        pays_us
            || tx.spent_outpoints().any(|outpoint| {
                state.watch.unspent_outputs.contains(outpoint)
                    || state.transactions.contains_key(&outpoint.txid)
            })
    }

    fn record(state: &mut WalletState, tx: &Transaction) -> Hash {
        let hash = tx.hash();
        for outpoint in tx.spent_outpoints() {
            state.spent.insert(*outpoint, hash);
        }
        state.transactions.insert(hash, tx.clone());
        hash
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

impl WalletGateway for InMemoryWallet {
    fn is_relevant(&self, tx: &Transaction) -> bool {
        Self::relevant(&self.state.lock(), tx)
    }

    fn is_known(&self, hash: &Hash) -> bool {
        self.state.lock().transactions.contains_key(hash)
    }

    fn conflicts(&self, tx: &Transaction) -> bool {
        let hash = tx.hash();
        let state = self.state.lock();
        tx.spent_outpoints()
            .any(|outpoint| state.spent.get(outpoint).is_some_and(|spender| *spender != hash))
    }

    fn watch_list(&self) -> WatchList {
        self.state.lock().watch.clone()
    }

    fn register_published(&self, tx: &Transaction) {
        let mut state = self.state.lock();
        let hash = Self::record(&mut state, tx);
        state.published.push(hash);
    }

    fn register_relayed(&self, tx: &Transaction) -> bool {
        let mut state = self.state.lock();
        if state.transactions.contains_key(&tx.hash()) || !Self::relevant(&state, tx) {
            return false;
        }
        Self::record(&mut state, tx);
        true
    }

    fn mark_seen(&self, hash: &Hash, peers: usize) {
        self.state.lock().seen.insert(*hash, peers);
    }
}

/// Address store keeping insertion order.
#[derive(Default)]
pub struct InMemoryPeerAddressStore {
    peers: Mutex<Vec<SocketAddr>>,
}

impl InMemoryPeerAddressStore {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        let store = Self::default();
        store.add_peers(&peers);
        store
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerAddressStore for InMemoryPeerAddressStore {
    fn get_peers(&self, limit: usize) -> Vec<SocketAddr> {
        self.peers.lock().iter().take(limit).copied().collect()
    }

    fn add_peers(&self, peers: &[SocketAddr]) {
        let mut stored = self.peers.lock();
        let mut seen: HashSet<SocketAddr> = stored.iter().copied().collect();
        for peer in peers {
            if seen.insert(*peer) {
                stored.push(*peer);
            }
        }
    }

    fn remove_peer(&self, address: &SocketAddr) {
        self.peers.lock().retain(|peer| peer != address);
    }
}

/// Connector that records connections and keeps each session's command queue.
#[derive(Default)]
pub struct MockConnector {
    connections: Mutex<Vec<(PeerId, SocketAddr, i32)>>,
    receivers: Mutex<HashMap<PeerId, mpsc::UnboundedReceiver<SessionCommand>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(peer, address, local height)` for every connect call.
    pub fn connections(&self) -> Vec<(PeerId, SocketAddr, i32)> {
        self.connections.lock().clone()
    }

    pub fn peer_for(&self, address: SocketAddr) -> Option<PeerId> {
        self.connections
            .lock()
            .iter()
            .rev()
            .find(|(_, a, _)| *a == address)
            .map(|(id, _, _)| *id)
    }

    /// Commands sent to `peer` since the last call.
    pub fn take_commands(&self, peer: PeerId) -> Vec<SessionCommand> {
        let mut receivers = self.receivers.lock();
        let mut commands = Vec::new();
        if let Some(rx) = receivers.get_mut(&peer) {
            while let Ok(command) = rx.try_recv() {
                commands.push(command);
            }
        }
        commands
    }
}

impl PeerConnector for MockConnector {
    fn connect(
        &self,
        peer: PeerId,
        address: SocketAddr,
        local_height: i32,
        _sink: EventSink,
    ) -> PeerLink {
        let (link, rx) = PeerLink::channel();
        self.connections.lock().push((peer, address, local_height));
        self.receivers.lock().insert(peer, rx);
        link
    }
}

/// Scheduler that only records what was armed.
#[derive(Default)]
pub struct MockWatchdog {
    scheduled: Mutex<Vec<(u64, Duration)>>,
}

impl MockWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_generation(&self) -> Option<u64> {
        self.scheduled.lock().last().map(|(generation, _)| *generation)
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().len()
    }
}

impl WatchdogScheduler for MockWatchdog {
    fn schedule(&self, generation: u64, after: Duration, _sink: EventSink) {
        self.scheduled.lock().push((generation, after));
    }
}
