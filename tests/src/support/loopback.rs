//! In-process network: the real pool and real sessions, each session wired
//! to a [`RemotePeer`] instead of a socket.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use spv_chain::test_utils::test_chain_state;
use spv_chain::{ChainParams, InMemoryBlockStore, SystemTimeSource};
use spv_network::ports::{MockConnector, MockWatchdog};
use spv_network::service::Sequencer;
use spv_network::{
    EventSink, InMemoryPeerAddressStore, InMemoryWallet, Message, PeerId, PeerPool, PeerPoolApi,
    PeerSession, PoolConfig, PoolNotification, PoolPorts, SessionConfig,
};
use tokio::sync::broadcast;

use super::remote::{wallet_watch_list, RemotePeer};

const MAX_ROUNDS: usize = 10_000;

pub fn addr(i: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, i], 18444))
}

struct Link {
    session: PeerSession,
    remote: RemotePeer,
}

pub struct Loopback {
    pub pool: PeerPool<InMemoryBlockStore>,
    pub wallet: Arc<InMemoryWallet>,
    pub watchdog: Arc<MockWatchdog>,
    connector: Arc<MockConnector>,
    templates: HashMap<SocketAddr, RemotePeer>,
    links: BTreeMap<PeerId, Link>,
    attached: usize,
    notifications: broadcast::Receiver<PoolNotification>,
    seen: Vec<PoolNotification>,
}

impl Loopback {
    /// A pool whose address store lists `remotes` in order.
    pub fn new(config: PoolConfig, remotes: Vec<(SocketAddr, RemotePeer)>) -> Self {
        let connector = Arc::new(MockConnector::new());
        let watchdog = Arc::new(MockWatchdog::new());
        let wallet = Arc::new(InMemoryWallet::new(wallet_watch_list()));
        let addresses = Arc::new(InMemoryPeerAddressStore::new(
            remotes.iter().map(|(address, _)| *address).collect(),
        ));
        let ports = PoolPorts {
            wallet: wallet.clone(),
            addresses,
            connector: connector.clone(),
            watchdog: watchdog.clone(),
        };
        let sink = EventSink::new(Arc::new(Sequencer::new(64, 16)));
        let pool = PeerPool::new(config, test_chain_state(), ports, sink);
        let notifications = pool.subscribe();
        Self {
            pool,
            wallet,
            watchdog,
            connector,
            templates: remotes.into_iter().collect(),
            links: BTreeMap::new(),
            attached: 0,
            notifications,
            seen: Vec::new(),
        }
    }

    /// Start the pool and run until nothing moves.
    pub fn start(&mut self) {
        self.pool.start();
        self.run();
    }

    pub fn peer(&self, address: SocketAddr) -> PeerId {
        match self.connector.peer_for(address) {
            Some(peer) => peer,
            None => panic!("never connected to {address}"),
        }
    }

    pub fn is_live(&self, peer: PeerId) -> bool {
        self.links.contains_key(&peer)
    }

    pub fn remote(&self, peer: PeerId) -> &RemotePeer {
        match self.links.get(&peer) {
            Some(link) => &link.remote,
            None => panic!("{peer} is not connected"),
        }
    }

    pub fn remote_mut(&mut self, peer: PeerId) -> &mut RemotePeer {
        match self.links.get_mut(&peer) {
            Some(link) => &mut link.remote,
            None => panic!("{peer} is not connected"),
        }
    }

    /// Deliver `message` from `peer`'s remote, then settle.
    pub fn deliver(&mut self, peer: PeerId, message: Message) {
        if let Some(link) = self.links.get_mut(&peer) {
            if let Err(e) = link.session.handle_message(message) {
                link.session.close(e.disconnect_reason());
            }
        }
        self.run();
    }

    /// Every notification broadcast so far.
    pub fn notifications(&mut self) -> &[PoolNotification] {
        self.collect();
        &self.seen
    }

    /// Pump commands, messages and events until a round changes nothing.
    pub fn run(&mut self) {
        for _ in 0..MAX_ROUNDS {
            let progressed = self.step();
            self.collect();
            if !progressed {
                return;
            }
        }
        panic!("loopback network did not settle");
    }

    fn collect(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            self.seen.push(notification);
        }
    }

    fn attach(&mut self) -> bool {
        let connections = self.connector.connections();
        let fresh = connections.len() > self.attached;
        for (peer, address, local_height) in connections.into_iter().skip(self.attached) {
            let Some(template) = self.templates.get(&address) else {
                panic!("no remote configured for {address}");
            };
            let mut session = PeerSession::new(
                peer,
                address,
                SessionConfig::for_testing(),
                ChainParams::for_testing(),
                self.wallet.clone(),
                Arc::new(SystemTimeSource),
            );
            session.connect(local_height);
            self.links.insert(
                peer,
                Link {
                    session,
                    remote: template.clone(),
                },
            );
            self.attached += 1;
        }
        fresh
    }

    fn step(&mut self) -> bool {
        let mut progressed = self.attach();
        let peers: Vec<PeerId> = self.links.keys().copied().collect();
        for peer in peers {
            let commands = self.connector.take_commands(peer);
            let Some(link) = self.links.get_mut(&peer) else {
                continue;
            };
            if !link.session.is_closed() {
                progressed |= !commands.is_empty();
                for command in commands {
                    link.session.handle_command(command);
                }
            }

            let output = link.session.drain();
            let closed = link.session.is_closed();
            if !closed {
                for message in output.messages {
                    if link.session.is_closed() {
                        break;
                    }
                    progressed = true;
                    for reply in link.remote.answer(message) {
                        if let Err(e) = link.session.handle_message(reply) {
                            link.session.close(e.disconnect_reason());
                            break;
                        }
                    }
                }
            }

            let idle = output.events.is_empty();
            for event in output.events {
                progressed = true;
                self.pool.handle_peer_event(peer, event);
            }
            if closed && idle {
                self.links.remove(&peer);
            }
        }
        progressed
    }
}
