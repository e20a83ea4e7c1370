//! # SPV Node
//!
//! Wires the sync core to real sockets: chain state over an in-memory block
//! store, the wallet watch list, the TCP connector and the peer pool worker.
//!
//! ## Configuration
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SPV_CONFIG` | TOML file with `SpvConfig` (defaults when unset) |
//! | `SPV_NETWORK` | Overrides `network` |
//! | `SPV_SEED_PEERS` | Comma-separated `ip:port` list, overrides `seed_peers` |
//! | `SPV_WATCH_LIST` | JSON file with the wallet's `WatchList` |

#![warn(clippy::all)]

pub mod metrics;

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use spv_bloom_filters::WatchList;
use spv_chain::{ChainState, InMemoryBlockStore, Network};
use spv_network::{
    EventSink, InMemoryPeerAddressStore, InMemoryWallet, PoolHandle, PoolNotification, PoolPorts,
    PoolStatus, SpvConfig, TcpConnector, TokioWatchdog,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the sequencer depth gauge is sampled.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Load `SpvConfig` from `SPV_CONFIG` and apply environment overrides.
pub fn load_config() -> Result<SpvConfig> {
    let mut config = match env::var("SPV_CONFIG") {
        Ok(path) => SpvConfig::load(&path).with_context(|| format!("Loading {path}"))?,
        Err(_) => SpvConfig::default(),
    };

    if let Ok(network) = env::var("SPV_NETWORK") {
        config.network = network
            .parse::<Network>()
            .map_err(|e| anyhow!("SPV_NETWORK: {e}"))?;
    }
    if let Ok(peers) = env::var("SPV_SEED_PEERS") {
        config.seed_peers = parse_peer_list(&peers)?;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Parse `ip:port` entries separated by commas.
pub fn parse_peer_list(list: &str) -> Result<Vec<SocketAddr>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid peer address {entry:?}"))
        })
        .collect()
}

/// Read the watch list named by `SPV_WATCH_LIST`, empty when unset.
pub fn load_watch_list() -> Result<WatchList> {
    match env::var("SPV_WATCH_LIST") {
        Ok(path) => read_watch_list(&path),
        Err(_) => Ok(WatchList::default()),
    }
}

pub fn read_watch_list<P: AsRef<Path>>(path: P) -> Result<WatchList> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
}

/// A running sync node.
pub struct NodeRuntime {
    pool: PoolHandle,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Build every component and start connecting.
    pub async fn start(config: SpvConfig, watch_list: WatchList) -> Result<Self> {
        let params = config.chain_params();
        info!(
            network = ?params.network,
            seeds = config.seed_peers.len(),
            addresses = watch_list.addresses.len(),
            outputs = watch_list.unspent_outputs.len(),
            "Starting SPV node"
        );

        let chain = ChainState::new(params.clone(), InMemoryBlockStore::new())
            .context("Failed to load chain state")?;
        let wallet = Arc::new(InMemoryWallet::new(watch_list));
        let addresses = Arc::new(InMemoryPeerAddressStore::new(config.seed_peers.clone()));
        if addresses.is_empty() {
            warn!("No seed peers configured; the pool has nobody to connect to");
        }
        let connector = Arc::new(TcpConnector::new(
            config.session.clone(),
            params,
            wallet.clone(),
        ));
        let ports = PoolPorts {
            wallet,
            addresses,
            connector,
            watchdog: Arc::new(TokioWatchdog),
        };

        let pool = PoolHandle::spawn(config.pool.clone(), chain, ports);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(observe_notifications(pool.subscribe(), shutdown_rx.clone())),
            tokio::spawn(sample_sequencer(pool.sink(), shutdown_rx)),
        ];
        pool.start().await.context("Peer pool stopped before start")?;

        Ok(Self {
            pool,
            shutdown_tx,
            tasks,
        })
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    /// Log a one-line summary of the pool.
    pub async fn log_status(&self) -> Result<PoolStatus> {
        let status = self.pool.status().await?;
        info!(
            height = status.height,
            peers = status.connected_peers,
            download_peer = ?status.download_peer,
            syncing = status.synchronizing,
            sync_failed = status.sync_failed,
            "Pool status"
        );
        Ok(status)
    }

    /// Stop the pool and the background tasks.
    pub async fn shutdown(mut self) {
        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(true);
        self.pool.stop().await;
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("Shutdown complete");
    }
}

async fn observe_notifications(
    mut notifications: broadcast::Receiver<PoolNotification>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(notification) => {
                    log_notification(&notification);
                    metrics::record_notification(&notification);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}

fn log_notification(notification: &PoolNotification) {
    match notification {
        PoolNotification::SyncStarted { from, to } => info!(from, to, "Sync started"),
        PoolNotification::SyncCompleted { height } => info!(height, "Sync completed"),
        PoolNotification::SyncFailed { failures } => {
            warn!(failures, "Sync failed; restart the node to retry")
        }
        PoolNotification::PeerCountChanged { connected } => info!(connected, "Peer count changed"),
        PoolNotification::ChainChanged { .. } | PoolNotification::TxSeen { .. } => {}
    }
}

async fn sample_sequencer(sink: EventSink, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                spv_telemetry::SEQUENCER_DEPTH.set(i64::try_from(sink.depth()).unwrap_or(i64::MAX));
            }
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spv_bloom_filters::WatchedAddress;

    #[test]
    fn test_parse_peer_list() {
        let peers = parse_peer_list("127.0.0.1:18444, 10.0.0.2:8333,").unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1].port(), 8333);
        assert!(parse_peer_list("not-an-address").is_err());
        assert!(parse_peer_list("").unwrap().is_empty());
    }

    #[test]
    fn test_read_watch_list() {
        let watch = WatchList {
            addresses: vec![WatchedAddress {
                public_key: vec![2; 33],
                public_key_hash: [7; 20],
            }],
            unspent_outputs: Vec::new(),
        };
        let path = env::temp_dir().join(format!("spv-watch-{}.json", std::process::id()));
        fs::write(&path, serde_json::to_string(&watch).unwrap()).unwrap();

        assert_eq!(read_watch_list(&path).unwrap(), watch);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_watch_list_file() {
        assert!(read_watch_list("/nonexistent/spv-watch.json").is_err());
    }
}
