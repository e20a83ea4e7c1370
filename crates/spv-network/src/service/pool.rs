//! # Peer Pool
//!
//! Owns every connection, the shared bloom filter and the chain state. All
//! mutation happens on one sequencer worker; sessions reach the pool only
//! through [`EventSink`] and hear back over their [`PeerLink`].
//!
//! ## Retry Policy
//!
//! | Disconnect | Effect |
//! |------------|--------|
//! | `Normal` | address may be retried |
//! | `Timeout` | counts toward the per-address cap, then abandoned |
//! | `ProtocolViolation` | counts toward the pool-wide cap |
//! | `Incompatible` | abandoned immediately |
//!
//! Crossing the pool-wide cap declares the sync failed; nothing reconnects
//! until [`PeerPoolApi::start`] is called again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use shared_types::{hash_to_hex, Block, BlockHeader, Hash, Transaction};
use spv_bloom_filters::{build_wallet_filter, BloomFilter};
use spv_chain::{BlockStore, ChainError, ChainState, ChainStateApi};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sequencer::Sequencer;
use super::sink::{EventSink, PoolTask};
use crate::config::PoolConfig;
use crate::domain::{
    elect_download_peer, Candidate, DisconnectReason, PeerEvent, PeerId, PeerInfo,
    PoolNotification, SessionCommand,
};
use crate::error::{PoolError, PublishError};
use crate::ports::{
    PeerAddressStore, PeerConnector, PeerLink, PeerPoolApi, PoolStatus, WalletGateway,
    WatchdogScheduler,
};

/// Blocks older than the wallet by more than this are synced headers-only.
pub const HEADERS_ONLY_MARGIN_SECS: u64 = 7 * 24 * 60 * 60;

const NOTIFICATION_CAPACITY: usize = 256;

/// Outbound dependencies of the pool.
#[derive(Clone)]
pub struct PoolPorts {
    pub wallet: Arc<dyn WalletGateway>,
    pub addresses: Arc<dyn PeerAddressStore>,
    pub connector: Arc<dyn PeerConnector>,
    pub watchdog: Arc<dyn WatchdogScheduler>,
}

struct PeerEntry {
    address: SocketAddr,
    link: PeerLink,
    /// Set once the handshake completes.
    info: Option<PeerInfo>,
    ping_ms: Option<f64>,
}

/// The peer pool. Driven by [`PoolHandle`] in production.
pub struct PeerPool<S: BlockStore> {
    config: PoolConfig,
    chain: ChainState<S>,
    ports: PoolPorts,
    sink: EventSink,
    notifications: broadcast::Sender<PoolNotification>,

    peers: BTreeMap<PeerId, PeerEntry>,
    next_peer_id: u64,
    abandoned: HashSet<SocketAddr>,
    download_peer: Option<PeerId>,

    published_tx: HashMap<Hash, Transaction>,
    relay_witnesses: HashMap<Hash, HashSet<PeerId>>,
    bloom_filter: Option<BloomFilter>,
    tweak: u32,
    blocks_since_rebuild: u32,

    connect_failure_count: u32,
    timeout_counts: HashMap<SocketAddr, u32>,
    running: bool,
    synchronizing: bool,
    headers_only: bool,
    sync_failed: bool,
    watchdog_generation: u64,
}

impl<S: BlockStore> PeerPool<S> {
    pub fn new(config: PoolConfig, chain: ChainState<S>, ports: PoolPorts, sink: EventSink) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            config,
            chain,
            ports,
            sink,
            notifications,
            peers: BTreeMap::new(),
            next_peer_id: 1,
            abandoned: HashSet::new(),
            download_peer: None,
            published_tx: HashMap::new(),
            relay_witnesses: HashMap::new(),
            bloom_filter: None,
            tweak: rand::thread_rng().gen(),
            blocks_since_rebuild: 0,
            connect_failure_count: 0,
            timeout_counts: HashMap::new(),
            running: false,
            synchronizing: false,
            headers_only: false,
            sync_failed: false,
            watchdog_generation: 0,
        }
    }

    pub fn chain(&self) -> &ChainState<S> {
        &self.chain
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolNotification> {
        self.notifications.subscribe()
    }

    pub fn download_peer(&self) -> Option<PeerId> {
        self.download_peer
    }

    pub fn is_abandoned(&self, address: &SocketAddr) -> bool {
        self.abandoned.contains(address)
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|p| p.info.is_some()).count()
    }

    /// Run one sequencer task.
    pub fn apply(&mut self, task: PoolTask) {
        match task {
            PoolTask::Start => self.start(),
            PoolTask::Stop => self.stop(),
            PoolTask::Peer { peer, event } => self.handle_peer_event(peer, event),
            PoolTask::Publish { tx, reply } => {
                let result = self.publish(tx);
                let _ = reply.send(result);
            }
            PoolTask::WalletChanged => self.wallet_changed(),
            PoolTask::WatchdogFired { generation } => self.watchdog_fired(generation),
            PoolTask::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn notify(&self, notification: PoolNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    fn send_to(&self, peer: PeerId, command: SessionCommand) {
        if let Some(entry) = self.peers.get(&peer) {
            if !entry.link.send(command) {
                debug!(%peer, "Session already gone");
            }
        }
    }

    fn connected_peers(&self) -> impl Iterator<Item = (PeerId, &PeerEntry)> {
        self.peers
            .iter()
            .filter(|(_, entry)| entry.info.is_some())
            .map(|(id, entry)| (*id, entry))
    }

    fn peer_height(&self, peer: PeerId) -> Option<i32> {
        self.peers.get(&peer)?.info.as_ref().map(|info| info.height)
    }

    // =========================================================================
    // Connections
    // =========================================================================

    fn fill_connections(&mut self) {
        if !self.running || self.sync_failed {
            return;
        }
        let wanted = self.config.max_connections.saturating_sub(self.peers.len());
        if wanted == 0 {
            return;
        }
        let in_use: HashSet<SocketAddr> = self.peers.values().map(|p| p.address).collect();
        let candidates: Vec<SocketAddr> = self
            .ports
            .addresses
            .get_peers(self.config.max_connections * 4)
            .into_iter()
            .filter(|address| !in_use.contains(address) && !self.abandoned.contains(address))
            .take(wanted)
            .collect();
        if candidates.is_empty() {
            debug!(connected = self.peers.len(), "No peer addresses available");
        }
        for address in candidates {
            let id = PeerId(self.next_peer_id);
            self.next_peer_id += 1;
            let link =
                self.ports
                    .connector
                    .connect(id, address, self.chain.height(), self.sink.clone());
            debug!(peer = %id, %address, "Connecting");
            self.peers.insert(
                id,
                PeerEntry {
                    address,
                    link,
                    info: None,
                    ping_ms: None,
                },
            );
        }
    }

    fn on_connected(&mut self, peer: PeerId, info: PeerInfo) {
        let Some(entry) = self.peers.get_mut(&peer) else {
            return;
        };
        entry.info = Some(info);
        let filter = self.current_filter();
        self.send_to(peer, SessionCommand::LoadFilter(filter));
        self.notify(PoolNotification::PeerCountChanged {
            connected: self.connected_count(),
        });
        self.elect_and_sync();
    }

    fn elect_and_sync(&mut self) {
        let candidates: Vec<Candidate> = self
            .connected_peers()
            .filter_map(|(id, entry)| {
                entry.info.as_ref().map(|info| Candidate {
                    id,
                    height: info.height,
                    ping_ms: entry.ping_ms,
                })
            })
            .collect();
        let elected = elect_download_peer(&candidates, self.download_peer);
        if elected != self.download_peer {
            if let Some(previous) = self.download_peer.filter(|p| self.peers.contains_key(p)) {
                info!(%previous, replacement = ?elected, "Replacing download peer");
                self.send_to(previous, SessionCommand::Disconnect(DisconnectReason::Normal));
                self.synchronizing = false;
            }
            self.download_peer = elected;
        }
        self.maybe_start_sync();
    }

    fn maybe_start_sync(&mut self) {
        if self.synchronizing || self.sync_failed {
            return;
        }
        let Some(peer) = self.download_peer else {
            return;
        };
        let Some(peer_height) = self.peer_height(peer) else {
            return;
        };
        let local_height = self.chain.height();
        if peer_height <= local_height {
            return;
        }
        let locator = match self.chain.block_locator() {
            Ok(locator) => locator,
            Err(e) => {
                warn!(error = %e, "Cannot build block locator");
                return;
            }
        };

        self.synchronizing = true;
        self.headers_only = self.before_wallet_creation(self.chain.tip());
        info!(%peer, from = local_height, to = peer_height, headers_only = self.headers_only, "Sync started");

        // The filter rate depends on how far behind we are.
        self.rebuild_bloom_filter();
        self.send_to(
            peer,
            SessionCommand::StartSync {
                local_height,
                locator,
                headers_only: self.headers_only,
            },
        );
        self.notify(PoolNotification::SyncStarted {
            from: local_height,
            to: peer_height,
        });
        self.arm_watchdog();
    }

    fn before_wallet_creation(&self, header: &BlockHeader) -> bool {
        u64::from(header.timestamp()) + HEADERS_ONLY_MARGIN_SECS < self.config.wallet_creation_time
    }

    fn check_sync_complete(&mut self) {
        if !self.synchronizing {
            return;
        }
        let Some(peer) = self.download_peer else {
            return;
        };
        let height = self.chain.height();
        if self.peer_height(peer).is_some_and(|target| height >= target) {
            self.synchronizing = false;
            self.headers_only = false;
            self.watchdog_generation += 1;
            self.send_to(peer, SessionCommand::EndSync);
            info!(%peer, height, "Sync completed");
            self.notify(PoolNotification::SyncCompleted { height });
            if let Err(e) = self.chain.prune_orphans() {
                warn!(error = %e, "Failed to prune orphans");
            }
            self.rebuild_bloom_filter();
        }
    }

    // =========================================================================
    // Watchdog
    // =========================================================================

    fn arm_watchdog(&mut self) {
        self.watchdog_generation += 1;
        self.ports.watchdog.schedule(
            self.watchdog_generation,
            self.config.sync_watchdog(),
            self.sink.clone(),
        );
    }

    fn rearm_if_download_peer(&mut self, peer: PeerId) {
        if self.synchronizing && self.download_peer == Some(peer) {
            self.arm_watchdog();
        }
    }

    // =========================================================================
    // Bloom filter
    // =========================================================================

    fn current_filter(&mut self) -> BloomFilter {
        if let Some(filter) = &self.bloom_filter {
            return filter.clone();
        }
        let watch = self.ports.wallet.watch_list();
        let local_height = self.chain.height();
        let peer_height = self
            .download_peer
            .and_then(|peer| self.peer_height(peer))
            .unwrap_or(local_height);
        let fp_rate = self.config.bloom.fp_rate_for(local_height, peer_height);
        let filter = build_wallet_filter(&watch, fp_rate, self.tweak);
        debug!(
            addresses = watch.addresses.len(),
            outputs = watch.unspent_outputs.len(),
            fp_rate,
            "Bloom filter rebuilt"
        );
        self.bloom_filter = Some(filter.clone());
        filter
    }

    /// Invalidate the filter and send a fresh one to every connected peer.
    pub fn rebuild_bloom_filter(&mut self) {
        self.bloom_filter = None;
        self.blocks_since_rebuild = 0;
        let filter = self.current_filter();
        let peers: Vec<PeerId> = self.connected_peers().map(|(id, _)| id).collect();
        for peer in peers {
            self.send_to(peer, SessionCommand::LoadFilter(filter.clone()));
        }
    }

    // =========================================================================
    // Relay
    // =========================================================================

    /// A relevant transaction arrived from `peer`.
    pub fn relay_inbound_tx(&mut self, peer: PeerId, tx: Transaction) {
        let hash = tx.hash();
        let newly_stored = self.ports.wallet.register_relayed(&tx);
        if matches!(self.chain.store().tx_confirmation(&hash), Ok(None)) {
            // Keep it on hand so other peers asking for it get an answer.
            self.published_tx.entry(hash).or_insert_with(|| tx.clone());
        }

        let witnesses = self.relay_witnesses.entry(hash).or_default();
        if witnesses.insert(peer) {
            let count = witnesses.len();
            self.ports.wallet.mark_seen(&hash, count);
            self.notify(PoolNotification::TxSeen { hash, peers: count });
        }

        if newly_stored {
            debug!(%peer, hash = %hash_to_hex(&hash), "New wallet transaction relayed");
            self.rebuild_bloom_filter();
        }
    }

    /// Headers from `peer`; anything short of full acceptance abandons it.
    pub fn relay_header_batch(&mut self, peer: PeerId, mut headers: Vec<BlockHeader>) {
        let mut switch_to_blocks = false;
        if self.synchronizing && self.headers_only {
            if let Some(cut) = headers.iter().position(|h| !self.before_wallet_creation(h)) {
                headers.truncate(cut);
                switch_to_blocks = true;
            }
        }

        let old_tip = self.chain.tip().hash();
        let len = headers.len();
        match self.chain.accept_headers(headers) {
            Ok(outcome) if outcome.is_complete(len) => {
                debug!(%peer, accepted = outcome.accepted, skipped = outcome.skipped, "Headers accepted");
            }
            Ok(outcome) => {
                self.chain_moved(old_tip);
                self.abandon(
                    peer,
                    &format!("header batch stopped after {} of {len}", outcome.accepted),
                );
                return;
            }
            Err(e) => {
                self.chain_moved(old_tip);
                self.chain_error(peer, e);
                return;
            }
        }
        self.chain_moved(old_tip);

        if switch_to_blocks && self.synchronizing && self.download_peer == Some(peer) {
            self.headers_only = false;
            match self.chain.block_locator() {
                Ok(locator) => {
                    info!(%peer, height = self.chain.height(), "Reached wallet creation, switching to filtered blocks");
                    self.send_to(
                        peer,
                        SessionCommand::StartSync {
                            local_height: self.chain.height(),
                            locator,
                            headers_only: false,
                        },
                    );
                }
                Err(e) => warn!(error = %e, "Cannot build block locator"),
            }
        }
        self.check_sync_complete();
    }

    /// One filtered block from `peer`, plus any orphans it unlocks.
    pub fn relay_block(&mut self, peer: PeerId, block: Block) {
        let old_tip = self.chain.tip().hash();
        self.connect_block(peer, block);
        self.chain_moved(old_tip);
        if self.blocks_since_rebuild >= self.config.bloom.rebuild_after_blocks {
            self.rebuild_bloom_filter();
        }
        self.check_sync_complete();
    }

    pub fn relay_block_batch(&mut self, peer: PeerId, blocks: Vec<Block>) {
        for block in blocks {
            if !self.peers.contains_key(&peer) {
                break;
            }
            self.relay_block(peer, block);
        }
    }

    fn connect_block(&mut self, peer: PeerId, block: Block) {
        let mut next = Some(block);
        while let Some(block) = next.take() {
            let hash = block.hash();
            let confirmed = block.tx_hashes.clone();
            match self.chain.accept_block(block) {
                Ok(false) if self.chain.is_orphan(&hash) => {
                    if !self.synchronizing {
                        self.request_orphan_ancestors(peer, hash);
                    }
                }
                Ok(false) => {
                    debug!(%peer, hash = %hash_to_hex(&hash), "Block stored on a side branch");
                    next = self.chain.take_orphan_waiting_on(&hash);
                }
                Ok(true) => {
                    self.blocks_since_rebuild += 1;
                    for tx_hash in &confirmed {
                        self.published_tx.remove(tx_hash);
                    }
                    next = self.chain.take_orphan_waiting_on(&hash);
                }
                Err(e) => {
                    self.chain_error(peer, e);
                    return;
                }
            }
        }
    }

    fn request_orphan_ancestors(&mut self, peer: PeerId, orphan: Hash) {
        match self.chain.block_locator() {
            Ok(locator) => {
                debug!(%peer, hash = %hash_to_hex(&orphan), "Orphan block, requesting ancestors");
                self.send_to(
                    peer,
                    SessionCommand::RequestBlocks {
                        locator,
                        stop: orphan,
                    },
                );
            }
            Err(e) => warn!(error = %e, "Cannot build block locator"),
        }
    }

    fn chain_moved(&mut self, old_tip: Hash) {
        let tip = self.chain.tip();
        if tip.hash() != old_tip {
            self.notify(PoolNotification::ChainChanged {
                height: tip.height,
                hash: tip.hash(),
            });
        }
    }

    fn chain_error(&mut self, peer: PeerId, error: ChainError) {
        if error.is_peer_fault() {
            self.abandon(peer, &error.to_string());
        } else {
            warn!(%peer, error = %error, "Chain update failed");
        }
    }

    fn answer_tx_request(&mut self, peer: PeerId, hashes: Vec<Hash>) {
        let mut missing = Vec::new();
        for hash in hashes {
            match self.published_tx.get(&hash) {
                Some(tx) => self.send_to(peer, SessionCommand::SendTx(tx.clone())),
                None => missing.push(hash),
            }
        }
        if !missing.is_empty() {
            self.send_to(peer, SessionCommand::SendNotFound(missing));
        }
    }

    // =========================================================================
    // Peer lifecycle
    // =========================================================================

    /// Stop trusting `peer` for this run and replace it.
    pub fn abandon(&mut self, peer: PeerId, reason: &str) {
        let Some(entry) = self.peers.get(&peer) else {
            return;
        };
        warn!(%peer, address = %entry.address, reason, "Abandoning peer");
        let address = entry.address;
        self.abandoned.insert(address);
        self.ports.addresses.remove_peer(&address);
        self.send_to(peer, SessionCommand::Disconnect(DisconnectReason::ProtocolViolation));
        self.disconnected(peer, DisconnectReason::ProtocolViolation);
    }

    /// Bookkeeping for a finished connection, then reconnect.
    pub fn disconnected(&mut self, peer: PeerId, reason: DisconnectReason) {
        let Some(entry) = self.peers.remove(&peer) else {
            return;
        };
        let address = entry.address;
        match reason {
            DisconnectReason::Normal => {}
            DisconnectReason::Timeout => {
                let count = self.timeout_counts.entry(address).or_default();
                *count += 1;
                if *count >= self.config.max_timeout_failures {
                    warn!(%peer, %address, timeouts = *count, "Too many timeouts, abandoning address");
                    self.abandoned.insert(address);
                    self.ports.addresses.remove_peer(&address);
                }
            }
            DisconnectReason::ProtocolViolation => self.connect_failure_count += 1,
            DisconnectReason::Incompatible => {
                self.abandoned.insert(address);
                self.ports.addresses.remove_peer(&address);
            }
        }
        debug!(%peer, %address, ?reason, "Peer removed");

        if self.download_peer == Some(peer) {
            self.download_peer = None;
            if self.synchronizing {
                self.synchronizing = false;
                self.watchdog_generation += 1;
            }
        }
        if entry.info.is_some() {
            self.notify(PoolNotification::PeerCountChanged {
                connected: self.connected_count(),
            });
        }

        if self.connect_failure_count > self.config.max_connect_failures && !self.sync_failed {
            self.sync_failed = true;
            warn!(failures = self.connect_failure_count, "Synchronization failed");
            self.notify(PoolNotification::SyncFailed {
                failures: self.connect_failure_count,
            });
            return;
        }

        self.elect_and_sync();
        self.fill_connections();
    }
}

impl<S: BlockStore> PeerPoolApi for PeerPool<S> {
    fn start(&mut self) {
        info!(height = self.chain.height(), "Peer pool starting");
        self.running = true;
        self.sync_failed = false;
        self.connect_failure_count = 0;
        self.fill_connections();
    }

    fn stop(&mut self) {
        info!(peers = self.peers.len(), "Peer pool stopping");
        self.running = false;
        for entry in self.peers.values() {
            entry.link.send(SessionCommand::Disconnect(DisconnectReason::Normal));
        }
        let had_connected = self.connected_count() > 0;
        self.peers.clear();
        self.download_peer = None;
        self.synchronizing = false;
        self.watchdog_generation += 1;
        if had_connected {
            self.notify(PoolNotification::PeerCountChanged { connected: 0 });
        }
    }

    fn publish(&mut self, tx: Transaction) -> Result<(), PublishError> {
        if !tx.is_signed() {
            return Err(PublishError::Unsigned);
        }
        let hash = tx.hash();
        self.ports.wallet.register_published(&tx);
        self.published_tx.insert(hash, tx);
        self.rebuild_bloom_filter();

        // The first peer is left out of the announcement.
        let peers: Vec<PeerId> = self.connected_peers().skip(1).map(|(id, _)| id).collect();
        info!(hash = %hash_to_hex(&hash), peers = peers.len(), "Publishing transaction");
        for peer in peers {
            self.send_to(peer, SessionCommand::AnnounceTx(vec![hash]));
        }
        Ok(())
    }

    fn handle_peer_event(&mut self, peer: PeerId, event: PeerEvent) {
        if !self.peers.contains_key(&peer) {
            debug!(%peer, "Event from a removed peer");
            return;
        }
        match event {
            PeerEvent::Connected(info) => self.on_connected(peer, info),
            PeerEvent::PingMeasured(millis) => {
                if let Some(entry) = self.peers.get_mut(&peer) {
                    entry.ping_ms = Some(millis);
                }
            }
            PeerEvent::Headers(headers) => {
                self.rearm_if_download_peer(peer);
                self.relay_header_batch(peer, headers);
            }
            PeerEvent::Block(block) => {
                self.rearm_if_download_peer(peer);
                self.relay_block(peer, block);
            }
            PeerEvent::BlockBatch(blocks) => {
                self.rearm_if_download_peer(peer);
                self.relay_block_batch(peer, blocks);
            }
            PeerEvent::Transaction(tx) => {
                self.rearm_if_download_peer(peer);
                self.relay_inbound_tx(peer, tx);
            }
            PeerEvent::TxRequested(hashes) => self.answer_tx_request(peer, hashes),
            PeerEvent::Misbehaved(reason) => self.abandon(peer, &reason),
            PeerEvent::Disconnected(reason) => self.disconnected(peer, reason),
        }
    }

    fn wallet_changed(&mut self) {
        self.rebuild_bloom_filter();
    }

    fn watchdog_fired(&mut self, generation: u64) {
        if generation != self.watchdog_generation || !self.synchronizing {
            return;
        }
        let Some(peer) = self.download_peer else {
            return;
        };
        warn!(%peer, "Download peer stalled");
        self.send_to(peer, SessionCommand::Disconnect(DisconnectReason::Timeout));
        self.disconnected(peer, DisconnectReason::Timeout);
    }

    fn status(&self) -> PoolStatus {
        let tip = self.chain.tip();
        PoolStatus {
            running: self.running,
            synchronizing: self.synchronizing,
            sync_failed: self.sync_failed,
            height: tip.height,
            tip: tip.hash(),
            connected_peers: self.connected_count(),
            download_peer: self.download_peer,
            published: self.published_tx.len(),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Owns the sequencer worker running a [`PeerPool`].
pub struct PoolHandle {
    sink: EventSink,
    sequencer: Arc<Sequencer<PoolTask>>,
    notifications: broadcast::Sender<PoolNotification>,
    worker: Option<JoinHandle<()>>,
}

impl PoolHandle {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<S>(config: PoolConfig, chain: ChainState<S>, ports: PoolPorts) -> Self
    where
        S: BlockStore + 'static,
    {
        let sequencer = Arc::new(Sequencer::new(
            config.sequencer_capacity,
            config.sequencer_low_water,
        ));
        let sink = EventSink::new(sequencer.clone());
        let pool = PeerPool::new(config, chain, ports, sink.clone());
        let notifications = pool.notifications.clone();
        let worker = tokio::spawn(run_worker(pool, sequencer.clone()));
        Self {
            sink,
            sequencer,
            notifications,
            worker: Some(worker),
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolNotification> {
        self.notifications.subscribe()
    }

    pub async fn start(&self) -> Result<(), PoolError> {
        self.sink
            .submit(PoolTask::Start)
            .await
            .map_err(|_| PoolError::Stopped)
    }

    /// Disconnect everyone, drain queued tasks and wait for the worker.
    pub async fn stop(&mut self) {
        let _ = self.sink.submit(PoolTask::Stop).await;
        self.sequencer.close();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Pool worker ended abnormally");
            }
        }
    }

    /// Publish a signed transaction. Unsigned input fails without queueing.
    pub async fn publish(&self, tx: Transaction) -> Result<(), PublishError> {
        if !tx.is_signed() {
            return Err(PublishError::Unsigned);
        }
        let (reply, response) = oneshot::channel();
        self.sink
            .submit(PoolTask::Publish { tx, reply })
            .await
            .map_err(|_| PublishError::PoolStopped)?;
        response.await.unwrap_or(Err(PublishError::PoolStopped))
    }

    pub async fn wallet_changed(&self) -> Result<(), PoolError> {
        self.sink
            .submit(PoolTask::WalletChanged)
            .await
            .map_err(|_| PoolError::Stopped)
    }

    pub async fn status(&self) -> Result<PoolStatus, PoolError> {
        let (reply, response) = oneshot::channel();
        self.sink
            .submit(PoolTask::Status { reply })
            .await
            .map_err(|_| PoolError::Stopped)?;
        response.await.map_err(|_| PoolError::Stopped)
    }
}

async fn run_worker<S: BlockStore>(mut pool: PeerPool<S>, sequencer: Arc<Sequencer<PoolTask>>) {
    while let Some(task) = sequencer.next().await {
        pool.apply(task);
    }
    debug!("Pool worker finished");
}
