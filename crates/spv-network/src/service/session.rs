//! # Peer Session
//!
//! Sans-IO state machine for one connection. Inputs are decoded messages and
//! pool commands; outputs are messages to write and events for the pool,
//! collected with [`PeerSession::drain`].
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected
//!                 (version/verack both ways)
//! ```
//!
//! Filtered blocks are requested one at a time. A `merkleblock` stays in
//! flight until every matched transaction has arrived, or until the peer
//! answers the ping sent right after it.

use std::collections::{HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use rand::Rng;
use shared_types::{hash_to_hex, Block, BlockHeader, Hash, Transaction, ZERO_HASH};
use spv_bloom_filters::BloomFilter;
use spv_chain::{check_proof_of_work, ChainParams, TimeSource};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::domain::{
    verify_alert, DisconnectReason, InvItem, InvType, LocatorRequest, MerkleBlockMessage, Message,
    NetAddress, PeerEvent, PeerId, PeerInfo, PeerState, PingEstimate, RelayTracker,
    SessionCommand, VersionMessage, MAX_BLOCKS_INV, MAX_HEADERS, MAX_INV_ITEMS, NODE_NETWORK,
};
use crate::error::ProtocolError;
use crate::ports::WalletGateway;

/// What a session produced since the last drain.
#[derive(Debug, Default, PartialEq)]
pub struct SessionOutput {
    pub messages: Vec<Message>,
    pub events: Vec<PeerEvent>,
}

/// Filtered block waiting for its matched transactions.
#[derive(Debug)]
struct InFlightBlock {
    block: Block,
    remaining: HashSet<Hash>,
    /// Nonce of the ping sent behind the `merkleblock`.
    barrier: u64,
}

/// Catch-up bookkeeping for the download peer.
#[derive(Debug)]
struct SyncRun {
    local_height: i32,
    target_height: i32,
    headers_only: bool,
    received: i32,
    buffer: Vec<Block>,
    /// Last hash tracked from an inventory that had more to offer; the next
    /// `getblocks` starts here.
    continue_from: Option<Hash>,
}

impl SyncRun {
    fn reached_target(&self) -> bool {
        self.local_height + self.received >= self.target_height
    }
}

/// One peer connection's protocol state.
pub struct PeerSession {
    id: PeerId,
    address: SocketAddr,
    config: SessionConfig,
    params: ChainParams,
    alert_key: Vec<u8>,
    wallet: Arc<dyn WalletGateway>,
    clock: Arc<dyn TimeSource>,

    state: PeerState,
    closed: bool,
    local_nonce: u64,
    peer_version: Option<VersionMessage>,
    sent_version_ack: bool,
    got_version_ack: bool,

    known_tx: LruCache<Hash, ()>,
    /// Transactions the peer actually delivered, as opposed to announced.
    received_tx: LruCache<Hash, ()>,
    requested_blocks: HashSet<Hash>,
    pending_blocks: VecDeque<Hash>,
    in_flight: Option<InFlightBlock>,
    filter_loaded: bool,
    deferred_filter: Option<BloomFilter>,
    sync: Option<SyncRun>,

    ping: PingEstimate,
    ping_sent: Option<(u64, Instant)>,
    irrelevant_streak: u32,
    relay: RelayTracker,

    outbox: Vec<Message>,
    events: Vec<PeerEvent>,
}

impl PeerSession {
    pub fn new(
        id: PeerId,
        address: SocketAddr,
        config: SessionConfig,
        params: ChainParams,
        wallet: Arc<dyn WalletGateway>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let alert_key = params.alert_key_bytes().unwrap_or_else(|e| {
            warn!(peer = %id, error = %e, "Alert key is not valid hex, alerts will not verify");
            Vec::new()
        });
        let capacity = NonZeroUsize::new(config.known_tx_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            id,
            address,
            config,
            params,
            alert_key,
            wallet,
            clock,
            state: PeerState::Disconnected,
            closed: false,
            local_nonce: rand::thread_rng().gen(),
            peer_version: None,
            sent_version_ack: false,
            got_version_ack: false,
            known_tx: LruCache::new(capacity),
            received_tx: LruCache::new(capacity),
            requested_blocks: HashSet::new(),
            pending_blocks: VecDeque::new(),
            in_flight: None,
            filter_loaded: false,
            deferred_filter: None,
            sync: None,
            ping: PingEstimate::default(),
            ping_sent: None,
            irrelevant_streak: 0,
            relay: RelayTracker::new(),
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn ping_millis(&self) -> Option<f64> {
        self.ping.millis()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_some()
    }

    pub fn pending_block_count(&self) -> usize {
        self.pending_blocks.len()
    }

    pub fn held_tx_count(&self) -> usize {
        self.relay.held_count()
    }

    /// Take everything produced since the last call.
    pub fn drain(&mut self) -> SessionOutput {
        SessionOutput {
            messages: std::mem::take(&mut self.outbox),
            events: std::mem::take(&mut self.events),
        }
    }

    fn send(&mut self, message: Message) {
        self.outbox.push(message);
    }

    fn emit(&mut self, event: PeerEvent) {
        self.events.push(event);
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Open the handshake by sending our `version`.
    pub fn connect(&mut self, local_height: i32) {
        self.state = PeerState::Connecting;
        let unspecified = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let version = VersionMessage {
            version: self.config.protocol_version,
            services: 0,
            timestamp: self.clock.now() as i64,
            receiver: NetAddress::new(self.address, NODE_NETWORK),
            sender: NetAddress::new(unspecified, 0),
            nonce: self.local_nonce,
            user_agent: self.config.user_agent.clone(),
            start_height: local_height,
            // Nothing is relayed until our filter is loaded.
            relay: false,
        };
        debug!(peer = %self.id, address = %self.address, local_height, "Sending version");
        self.send(Message::Version(version));
    }

    fn on_version(&mut self, version: VersionMessage) -> Result<(), ProtocolError> {
        if self.peer_version.is_some() {
            return Err(ProtocolError::Unexpected("version".into()));
        }
        if version.nonce == self.local_nonce {
            return Err(ProtocolError::Incompatible("connected to self".into()));
        }
        if version.version < self.config.min_protocol_version {
            return Err(ProtocolError::Incompatible(format!(
                "protocol version {} below {}",
                version.version, self.config.min_protocol_version
            )));
        }
        if version.services & NODE_NETWORK == 0 {
            return Err(ProtocolError::Incompatible(format!(
                "services {:#x} lack NODE_NETWORK",
                version.services
            )));
        }
        debug!(
            peer = %self.id,
            version = version.version,
            user_agent = %version.user_agent,
            height = version.start_height,
            "Got version"
        );
        self.peer_version = Some(version);
        self.send(Message::Verack);
        self.sent_version_ack = true;
        self.maybe_connected();
        Ok(())
    }

    fn maybe_connected(&mut self) {
        if self.state != PeerState::Connecting || !self.sent_version_ack || !self.got_version_ack {
            return;
        }
        let Some(version) = &self.peer_version else {
            return;
        };
        let info = PeerInfo {
            id: self.id,
            address: self.address,
            version: version.version,
            services: version.services,
            user_agent: version.user_agent.clone(),
            height: version.start_height,
        };
        self.state = PeerState::Connected;
        info!(peer = %self.id, address = %self.address, height = info.height, "Peer connected");
        self.emit(PeerEvent::Connected(info));
        self.send_ping();
    }

    fn send_ping(&mut self) -> u64 {
        let nonce = rand::thread_rng().gen();
        self.ping_sent = Some((nonce, Instant::now()));
        self.send(Message::Ping(Some(nonce)));
        nonce
    }

    // =========================================================================
    // Inbound messages
    // =========================================================================

    /// Apply one decoded message. An error means the connection must close
    /// with [`ProtocolError::disconnect_reason`].
    pub fn handle_message(&mut self, message: Message) -> Result<(), ProtocolError> {
        match message {
            Message::Version(version) => return self.on_version(version),
            Message::Verack => {
                if self.got_version_ack {
                    return Err(ProtocolError::Unexpected("verack".into()));
                }
                self.got_version_ack = true;
                self.maybe_connected();
                return Ok(());
            }
            _ => {}
        }

        if self.state != PeerState::Connected {
            debug!(peer = %self.id, command = message.command(), "Ignoring message before handshake");
            return Ok(());
        }

        match message {
            Message::Inv(items) => self.on_inv(items),
            Message::MerkleBlock(block) => self.on_merkle_block(block),
            Message::Tx(tx) => self.on_tx(tx)?,
            Message::NotFound(items) => self.on_not_found(items),
            Message::GetData(items) => self.on_get_data(items),
            Message::Headers(headers) => self.on_headers(headers),
            Message::Ping(Some(nonce)) => self.send(Message::Pong(nonce)),
            Message::Ping(None) => {}
            Message::Pong(nonce) => self.on_pong(nonce),
            Message::Reject(reject) => {
                warn!(
                    peer = %self.id,
                    message = %reject.message,
                    code = reject.code,
                    reason = %reject.reason,
                    hash = ?reject.data.as_ref().map(hash_to_hex),
                    "Peer rejected message"
                );
            }
            Message::Alert(alert) => {
                if verify_alert(&alert, &self.alert_key) {
                    info!(peer = %self.id, bytes = alert.payload.len(), "Received signed alert");
                } else {
                    warn!(peer = %self.id, "Dropping alert with invalid signature");
                }
            }
            other => {
                debug!(peer = %self.id, command = other.command(), "Ignoring message");
            }
        }
        Ok(())
    }

    fn on_inv(&mut self, items: Vec<InvItem>) {
        if items.len() > MAX_INV_ITEMS {
            warn!(peer = %self.id, count = items.len(), "Dropping oversized inv");
            return;
        }
        if !self.filter_loaded {
            debug!(peer = %self.id, count = items.len(), "Ignoring inv before filter is loaded");
            return;
        }

        let mut tx_requests = Vec::new();
        let mut block_hashes = Vec::new();
        for item in items {
            match item.kind {
                InvType::Tx => {
                    if self.known_tx.put(item.hash, ()).is_none() {
                        tx_requests.push(InvItem::tx(item.hash));
                    }
                }
                InvType::Block | InvType::FilteredBlock => block_hashes.push(item.hash),
                _ => {}
            }
        }

        let mut more_available = block_hashes.len() == MAX_BLOCKS_INV;
        let mut last_tracked = None;
        for hash in block_hashes {
            let in_flight = self.in_flight.as_ref().is_some_and(|f| f.block.hash() == hash);
            if in_flight
                || self.requested_blocks.contains(&hash)
                || self.pending_blocks.contains(&hash)
            {
                last_tracked = Some(hash);
                continue;
            }
            if self.pending_blocks.len() >= self.config.max_pending_blocks {
                debug!(peer = %self.id, hash = %hash_to_hex(&hash), "Pending block queue full");
                more_available = true;
                break;
            }
            self.pending_blocks.push_back(hash);
            last_tracked = Some(hash);
        }

        // Blocks past the queue limit are advertised again by the next getblocks.
        if let Some(sync) = self.sync.as_mut().filter(|sync| !sync.headers_only) {
            if more_available {
                sync.continue_from = last_tracked;
            }
        }

        if !tx_requests.is_empty() {
            self.send(Message::GetData(tx_requests));
        }
        self.request_next_block();
    }

    fn request_next_block(&mut self) {
        if self.in_flight.is_some() || !self.requested_blocks.is_empty() {
            return;
        }
        if let Some(hash) = self.pending_blocks.pop_front() {
            self.requested_blocks.insert(hash);
            self.send(Message::GetData(vec![InvItem::filtered_block(hash)]));
            return;
        }
        let (continue_from, headers_only) = match self.sync.as_mut() {
            Some(sync) => (sync.continue_from.take(), sync.headers_only),
            None => return,
        };
        match continue_from {
            Some(from) => {
                self.send(Message::GetBlocks(LocatorRequest::new(vec![from], ZERO_HASH)));
            }
            // Nothing left outstanding.
            None if !headers_only => self.flush_sync_buffer(),
            None => {}
        }
    }

    fn on_merkle_block(&mut self, message: MerkleBlockMessage) {
        let MerkleBlockMessage { header, proof } = message;
        let hash = header.hash();
        if !self.requested_blocks.remove(&hash) {
            debug!(peer = %self.id, hash = %hash_to_hex(&hash), "Unrequested merkleblock");
        }

        let checked = check_proof_of_work(&header, self.params.max_target(), self.clock.now())
            .map_err(|e| e.to_string())
            .and_then(|()| proof.extract(&header.merkle_root()).map_err(|e| e.to_string()));
        let matches = match checked {
            Ok(matches) => matches,
            Err(reason) => {
                warn!(peer = %self.id, hash = %hash_to_hex(&hash), %reason, "Invalid merkleblock");
                self.emit(PeerEvent::Misbehaved(reason));
                return;
            }
        };

        let remaining: HashSet<Hash> = matches
            .matched_hashes
            .iter()
            .filter(|h| !self.received_tx.contains(*h))
            .copied()
            .collect();
        let block = Block::new(header, matches.matched_hashes);
        if remaining.is_empty() {
            self.complete_block(block);
        } else {
            // A pong to this ping means the peer sent everything it will.
            let barrier = self.send_ping();
            self.in_flight = Some(InFlightBlock {
                block,
                remaining,
                barrier,
            });
        }
    }

    fn complete_block(&mut self, block: Block) {
        self.in_flight = None;
        let batch_size = self.config.relay_batch_size;
        match self.sync.as_mut() {
            Some(sync) => {
                sync.received += 1;
                sync.buffer.push(block);
                let flush = sync.buffer.len() >= batch_size || sync.reached_target();
                if flush {
                    self.flush_sync_buffer();
                }
            }
            None => self.emit(PeerEvent::Block(block)),
        }
        if let Some(filter) = self.deferred_filter.take() {
            self.load_filter(filter);
        }
        self.request_next_block();
    }

    fn flush_sync_buffer(&mut self) {
        let Some(sync) = self.sync.as_mut() else {
            return;
        };
        if sync.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut sync.buffer);
        debug!(peer = %self.id, blocks = batch.len(), "Relaying block batch");
        self.emit(PeerEvent::BlockBatch(batch));
    }

    fn on_tx(&mut self, tx: Transaction) -> Result<(), ProtocolError> {
        let hash = tx.hash();
        self.known_tx.put(hash, ());
        self.received_tx.put(hash, ());
        let relevant = self.wallet.is_relevant(&tx);

        let in_block = self
            .in_flight
            .as_mut()
            .is_some_and(|flight| flight.remaining.remove(&hash));
        if in_block {
            if relevant {
                self.emit(PeerEvent::Transaction(tx));
            }
            let done = self.in_flight.as_ref().is_some_and(|f| f.remaining.is_empty());
            if done {
                if let Some(flight) = self.in_flight.take() {
                    self.complete_block(flight.block);
                }
            }
            return Ok(());
        }

        let awaited = self.relay.is_awaited(&hash);
        if !relevant && !awaited {
            self.irrelevant_streak += 1;
            if self.irrelevant_streak > self.config.irrelevant_tx_threshold {
                return Err(ProtocolError::Flooding {
                    count: self.irrelevant_streak,
                });
            }
            return Ok(());
        }
        self.irrelevant_streak = 0;

        if self.wallet.conflicts(&tx) {
            let purged = self.relay.purge(&hash);
            warn!(
                peer = %self.id,
                hash = %hash_to_hex(&hash),
                dependents = purged.len(),
                "Dropping conflicting transaction"
            );
            return Ok(());
        }

        if relevant {
            let missing: HashSet<Hash> = tx
                .parent_hashes()
                .filter(|parent| !self.wallet.is_known(parent))
                .collect();
            if missing.is_empty() {
                self.emit(PeerEvent::Transaction(tx));
            } else {
                let requests: Vec<InvItem> =
                    self.relay.hold(tx, missing).into_iter().map(InvItem::tx).collect();
                if !requests.is_empty() {
                    debug!(peer = %self.id, parents = requests.len(), "Requesting dependencies");
                    self.send(Message::GetData(requests));
                }
                // Dependents wait until this one is released in turn.
                return Ok(());
            }
        }

        self.release_dependents(&hash);
        Ok(())
    }

    fn release_dependents(&mut self, parent: &Hash) {
        for released in self.relay.resolve(parent) {
            let hash = released.hash();
            self.emit(PeerEvent::Transaction(released));
            // The released transaction may itself be a parent someone waits on.
            self.release_dependents(&hash);
        }
    }

    fn on_not_found(&mut self, items: Vec<InvItem>) {
        for item in items {
            match item.kind {
                InvType::Tx => self.release_dependents(&item.hash),
                InvType::Block | InvType::FilteredBlock => {
                    self.requested_blocks.remove(&item.hash);
                }
                _ => {}
            }
        }
        self.request_next_block();
    }

    fn on_get_data(&mut self, items: Vec<InvItem>) {
        let hashes: Vec<Hash> = items
            .into_iter()
            .filter(|item| item.kind == InvType::Tx)
            .map(|item| item.hash)
            .collect();
        if !hashes.is_empty() {
            self.emit(PeerEvent::TxRequested(hashes));
        }
    }

    fn on_headers(&mut self, headers: Vec<BlockHeader>) {
        let full = headers.len() == MAX_HEADERS;
        let last = headers.last().map(BlockHeader::hash);
        debug!(peer = %self.id, count = headers.len(), "Got headers");
        if !headers.is_empty() {
            self.emit(PeerEvent::Headers(headers));
        }
        let filtered = self.sync.as_ref().is_some_and(|sync| !sync.headers_only);
        if let Some(last) = last.filter(|_| full && !filtered) {
            self.send(Message::GetHeaders(LocatorRequest::new(vec![last], ZERO_HASH)));
        }
    }

    fn on_pong(&mut self, nonce: u64) {
        if let Some((sent, at)) = self.ping_sent {
            if sent == nonce {
                self.ping_sent = None;
                let millis = self.ping.update(at.elapsed().as_secs_f64() * 1000.0);
                self.emit(PeerEvent::PingMeasured(millis));
            }
        }
        let barrier_hit = self.in_flight.as_ref().is_some_and(|f| f.barrier == nonce);
        if barrier_hit {
            if let Some(flight) = self.in_flight.take() {
                debug!(
                    peer = %self.id,
                    missing = flight.remaining.len(),
                    "Completing block without unsent transactions"
                );
                self.complete_block(flight.block);
            }
        }
    }

    // =========================================================================
    // Pool commands
    // =========================================================================

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::LoadFilter(filter) => {
                if self.in_flight.is_some() {
                    self.deferred_filter = Some(filter);
                } else {
                    self.load_filter(filter);
                }
            }
            SessionCommand::StartSync {
                local_height,
                locator,
                headers_only,
            } => self.start_sync(local_height, locator, headers_only),
            SessionCommand::EndSync => {
                self.flush_sync_buffer();
                self.sync = None;
            }
            SessionCommand::RequestHeaders { locator, stop } => {
                self.send(Message::GetHeaders(LocatorRequest::new(locator, stop)));
            }
            SessionCommand::RequestBlocks { locator, stop } => {
                self.send(Message::GetBlocks(LocatorRequest::new(locator, stop)));
            }
            SessionCommand::AnnounceTx(hashes) => {
                for hash in &hashes {
                    self.known_tx.put(*hash, ());
                }
                self.send(Message::Inv(hashes.into_iter().map(InvItem::tx).collect()));
            }
            SessionCommand::SendTx(tx) => self.send(Message::Tx(tx)),
            SessionCommand::SendNotFound(hashes) => {
                self.send(Message::NotFound(hashes.into_iter().map(InvItem::tx).collect()));
            }
            SessionCommand::Disconnect(reason) => self.close(reason),
        }
    }

    fn load_filter(&mut self, filter: BloomFilter) {
        let first = !self.filter_loaded;
        self.send(Message::FilterLoad(filter));
        self.filter_loaded = true;
        if first {
            // Ask for matching unconfirmed transactions once.
            self.send(Message::MemPool);
        }
    }

    fn start_sync(&mut self, local_height: i32, locator: Vec<Hash>, headers_only: bool) {
        let target_height = self.peer_version.as_ref().map_or(0, |v| v.start_height);
        info!(
            peer = %self.id,
            from = local_height,
            to = target_height,
            headers_only,
            "Starting sync"
        );
        let buffer = self.sync.take().map(|s| s.buffer).unwrap_or_default();
        self.sync = Some(SyncRun {
            local_height,
            target_height,
            headers_only,
            received: 0,
            buffer,
            continue_from: None,
        });
        let request = LocatorRequest::new(locator, ZERO_HASH);
        if headers_only {
            self.send(Message::GetHeaders(request));
        } else {
            self.send(Message::GetBlocks(request));
        }
    }

    /// End the session. Later calls do nothing.
    pub fn close(&mut self, reason: DisconnectReason) {
        if self.closed {
            return;
        }
        self.flush_sync_buffer();
        self.sync = None;
        self.state = PeerState::Disconnected;
        self.closed = true;
        info!(peer = %self.id, ?reason, "Peer disconnected");
        self.emit(PeerEvent::Disconnected(reason));
    }
}
