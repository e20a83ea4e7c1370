//! Wallet filter construction
//!
//! Turns the wallet's watched keys and unspent outputs into the filter sent
//! to peers in `filterload`.

use serde::{Deserialize, Serialize};
use shared_types::{Encodable, OutPoint};
use tracing::debug;

use super::bloom_filter::{BloomFilter, BloomUpdate};

/// Fixed headroom added to every wallet filter's element budget.
pub const ELEMENT_SLACK: usize = 100;

/// A watched address: its public key and HASH160 of that key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAddress {
    pub public_key: Vec<u8>,
    pub public_key_hash: [u8; 20],
}

/// Everything the wallet wants peers to match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchList {
    pub addresses: Vec<WatchedAddress>,
    pub unspent_outputs: Vec<OutPoint>,
}

impl WatchList {
    /// Number of elements the filter is sized for.
    pub fn element_budget(&self) -> usize {
        2 * self.addresses.len() + self.unspent_outputs.len() + ELEMENT_SLACK
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.unspent_outputs.is_empty()
    }
}

/// Build the connection filter for `watch` at the given false positive rate.
pub fn build_wallet_filter(watch: &WatchList, fp_rate: f64, tweak: u32) -> BloomFilter {
    let mut filter = BloomFilter::new(watch.element_budget(), fp_rate, tweak, BloomUpdate::All);

    for address in &watch.addresses {
        filter.insert(&address.public_key);
        filter.insert(&address.public_key_hash);
    }
    for outpoint in &watch.unspent_outputs {
        filter.insert(&outpoint.to_bytes());
    }

    debug!(
        addresses = watch.addresses.len(),
        outputs = watch.unspent_outputs.len(),
        size_bytes = filter.size_bytes(),
        hash_funcs = filter.hash_count(),
        fp_rate,
        "Built wallet bloom filter"
    );
    filter
}
