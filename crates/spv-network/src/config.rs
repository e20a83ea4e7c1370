//! # Network Configuration
//!
//! Per-session protocol settings, pool policy and the aggregate loaded from
//! TOML at startup.
//!
//! ```toml
//! network = "testnet"
//! seed_peers = ["10.0.0.1:18333"]
//!
//! [session]
//! relay_batch_size = 200
//!
//! [pool]
//! max_connections = 6
//!
//! [pool.bloom]
//! default_fp_rate = 0.0005
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spv_bloom_filters::BloomConfig;
use spv_chain::config::{ChainParams, Network};
use thiserror::Error;

use crate::domain::PROTOCOL_VERSION;

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one peer connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub protocol_version: i32,
    /// Peers below this version are refused.
    pub min_protocol_version: i32,
    pub user_agent: String,
    /// Filtered block hashes queued per connection.
    pub max_pending_blocks: usize,
    /// Completed blocks buffered during sync before a batch is relayed.
    pub relay_batch_size: usize,
    /// Consecutive irrelevant relayed transactions tolerated.
    pub irrelevant_tx_threshold: u32,
    /// Transaction hashes remembered per connection.
    pub known_tx_capacity: usize,
    pub connect_timeout_secs: u64,
    /// Silence on the socket longer than this is a timeout.
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            min_protocol_version: PROTOCOL_VERSION,
            user_agent: format!("/spv-sync:{}/", env!("CARGO_PKG_VERSION")),
            max_pending_blocks: 1000,
            relay_batch_size: 100,
            irrelevant_tx_threshold: 1000,
            known_tx_capacity: 10_000,
            connect_timeout_secs: 10,
            inactivity_timeout_secs: 300,
        }
    }
}

impl SessionConfig {
    /// Small buffers so tests reach every threshold quickly.
    pub fn for_testing() -> Self {
        Self {
            max_pending_blocks: 8,
            relay_batch_size: 3,
            irrelevant_tx_threshold: 5,
            known_tx_capacity: 64,
            connect_timeout_secs: 1,
            inactivity_timeout_secs: 5,
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Peer pool policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    /// Pool-wide protocol failures tolerated before sync is declared failed.
    pub max_connect_failures: u32,
    /// Timeouts tolerated per address before it is abandoned.
    pub max_timeout_failures: u32,
    /// Download-peer silence tolerated during sync.
    pub sync_watchdog_secs: u64,
    /// Filter sizing and rebuild schedule.
    pub bloom: BloomConfig,
    /// Hard bound on queued sequencer tasks.
    pub sequencer_capacity: usize,
    /// Blocked producers resume once the queue drains to this depth.
    pub sequencer_low_water: usize,
    /// Unix time the wallet was created; earlier blocks are synced headers-only.
    pub wallet_creation_time: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            max_connect_failures: 20,
            max_timeout_failures: 3,
            sync_watchdog_secs: 60,
            bloom: BloomConfig::default(),
            sequencer_capacity: 1024,
            sequencer_low_water: 256,
            wallet_creation_time: 0,
        }
    }
}

impl PoolConfig {
    pub fn for_testing() -> Self {
        Self {
            max_connections: 3,
            max_connect_failures: 3,
            max_timeout_failures: 2,
            sync_watchdog_secs: 1,
            bloom: BloomConfig::for_testing(),
            sequencer_capacity: 16,
            sequencer_low_water: 4,
            wallet_creation_time: 0,
        }
    }

    pub fn sync_watchdog(&self) -> Duration {
        Duration::from_secs(self.sync_watchdog_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be positive".into()));
        }
        if self.sequencer_capacity == 0 || self.sequencer_low_water >= self.sequencer_capacity {
            return Err(ConfigError::Invalid(format!(
                "sequencer low water {} must be below capacity {}",
                self.sequencer_low_water, self.sequencer_capacity
            )));
        }
        self.bloom
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Everything the node needs to start syncing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpvConfig {
    pub network: Network,
    /// Addresses seeded into the peer address store.
    pub seed_peers: Vec<SocketAddr>,
    pub session: SessionConfig,
    pub pool: PoolConfig,
}

impl Default for SpvConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            seed_peers: Vec::new(),
            session: SessionConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl SpvConfig {
    pub fn for_testing() -> Self {
        Self {
            network: Network::Regtest,
            seed_peers: Vec::new(),
            session: SessionConfig::for_testing(),
            pool: PoolConfig::for_testing(),
        }
    }

    /// Parse from a TOML document; missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.min_protocol_version > self.session.protocol_version {
            return Err(ConfigError::Invalid(
                "min_protocol_version exceeds protocol_version".into(),
            ));
        }
        self.pool.validate()
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams::for_network(self.network)
    }
}
