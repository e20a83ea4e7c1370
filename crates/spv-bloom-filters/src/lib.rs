//! # SPV Bloom Filters
//!
//! BIP37 connection bloom filters used to ask peers for filtered blocks.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): pure logic, no I/O
//!   - `BloomFilter`: the wire-compatible probabilistic set
//!   - `hash_functions`: murmur3 with the BIP37 seed schedule
//!   - `parameters`: filter sizing and false-positive math
//!   - `BloomConfig`: false-positive schedule and rebuild policy
//!   - `WatchList` / `build_wallet_filter`: wallet data → filter
//!
//! ## Invariants
//!
//! - **No false negatives**: if inserted, `contains()` returns true.
//! - **Element budget**: a wallet filter is sized for
//!   `2 × addresses + unspent outputs + 100` elements.
//!
//! ## Usage Example
//!
//! ```ignore
//! use spv_bloom_filters::{build_wallet_filter, BloomConfig, WatchList};
//!
//! let config = BloomConfig::default();
//! let fp_rate = config.fp_rate_for(local_height, peer_height);
//! let filter = build_wallet_filter(&watch_list, fp_rate, tweak);
//! let payload = filter.to_filterload_payload();
//! ```

pub mod domain;
pub mod error;

pub use domain::{
    build_wallet_filter, BloomConfig, BloomFilter, BloomUpdate, WatchList, WatchedAddress,
    ELEMENT_SLACK, MAX_BLOOM_FILTER_SIZE, MAX_HASH_FUNCS,
};
pub use error::FilterError;
