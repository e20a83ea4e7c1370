//! # Chain Parameters
//!
//! Per-network constants: message magic, genesis header, difficulty schedule,
//! checkpoint and alert key.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHeader, Hash, ZERO_HASH};

use crate::domain::difficulty::decode_compact;

/// Blocks between difficulty transitions.
pub const DIFFICULTY_INTERVAL: i32 = 2016;

/// Expected duration of one difficulty interval (two weeks).
pub const TARGET_TIMESPAN: u32 = 14 * 24 * 60 * 60;

/// Merkle root shared by the mainnet, testnet and regtest genesis blocks.
const GENESIS_MERKLE_ROOT: Hash = [
    0x3b, 0xa3, 0xed, 0xfd, 0x7a, 0x7b, 0x12, 0xb2, 0x7a, 0xc7, 0x2c, 0x3e, 0x67, 0x76, 0x8f, 0x61,
    0x7f, 0xc8, 0x1b, 0xc3, 0x88, 0x8a, 0x51, 0x32, 0x3a, 0x9f, 0xb8, 0xaa, 0x4b, 0x1e, 0x5e, 0x4a,
];

const MAINNET_ALERT_KEY: &str = "04fc9702847840aaf195de8442ebecedf5b095cdbb9bc716bda9110971b28a49e0ead8564ff0db22209e0374782c093bb899692d524e9d6a6956e7c5ecbcd68284";
const TESTNET_ALERT_KEY: &str = "04302390343f91cc401d56d68b123028bf52e5fca1939df127f63c6467cdf9c8e2c14b61104cf817d0b780da337893ecc4aaff1309e536162dabbdb45200ca2b0a";

/// Supported networks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Network consensus and wire constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: Network,
    /// Message start bytes, little-endian.
    pub magic: u32,
    pub default_port: u16,
    pub difficulty_interval: i32,
    /// Seconds per difficulty interval.
    pub target_timespan: u32,
    /// Easiest allowed target, compact form.
    pub max_target_bits: u32,
    /// Competing blocks at or below this height are refused.
    pub checkpoint_height: i32,
    /// Uncompressed secp256k1 key for `alert` messages, hex.
    pub alert_public_key: String,
    /// Genesis header, connected at height 0.
    pub genesis: BlockHeader,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            magic: 0xD9B4_BEF9,
            default_port: 8333,
            genesis: genesis_header(1_231_006_505, 0x1d00_ffff, 2_083_236_893),
            difficulty_interval: DIFFICULTY_INTERVAL,
            target_timespan: TARGET_TIMESPAN,
            max_target_bits: 0x1d00_ffff,
            checkpoint_height: 295_000,
            alert_public_key: MAINNET_ALERT_KEY.to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            magic: 0x0709_110B,
            default_port: 18333,
            genesis: genesis_header(1_296_688_602, 0x1d00_ffff, 414_098_458),
            difficulty_interval: DIFFICULTY_INTERVAL,
            target_timespan: TARGET_TIMESPAN,
            max_target_bits: 0x1d00_ffff,
            checkpoint_height: 546,
            alert_public_key: TESTNET_ALERT_KEY.to_string(),
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            magic: 0xDAB5_BFFA,
            default_port: 18444,
            genesis: genesis_header(1_296_688_602, 0x207f_ffff, 2),
            difficulty_interval: DIFFICULTY_INTERVAL,
            target_timespan: TARGET_TIMESPAN,
            max_target_bits: 0x207f_ffff,
            checkpoint_height: 0,
            alert_public_key: TESTNET_ALERT_KEY.to_string(),
        }
    }

    /// Regtest with a ten-block difficulty interval so retargets are cheap to
    /// reach in tests.
    pub fn for_testing() -> Self {
        Self {
            difficulty_interval: 10,
            target_timespan: 10 * 600,
            ..Self::regtest()
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis.hash()
    }

    /// Easiest allowed target.
    pub fn max_target(&self) -> U256 {
        decode_compact(self.max_target_bits).unwrap_or_else(U256::zero)
    }

    /// Whether a block at `height` starts a new difficulty interval.
    pub fn is_retarget_height(&self, height: i32) -> bool {
        self.difficulty_interval > 0 && height % self.difficulty_interval == 0
    }

    /// Decoded alert key bytes.
    pub fn alert_key_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.alert_public_key)
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

fn genesis_header(timestamp: u32, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader::new(1, ZERO_HASH, GENESIS_MERKLE_ROOT, timestamp, bits, nonce).connected(0, true)
}
