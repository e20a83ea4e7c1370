//! Domain layer for bloom filters
//!
//! Pure business logic, no I/O.

pub mod bloom_filter;
pub mod config;
pub mod hash_functions;
pub mod parameters;
pub mod wallet_filter;

pub use bloom_filter::{BloomFilter, BloomUpdate, MAX_BLOOM_FILTER_SIZE, MAX_HASH_FUNCS};
pub use config::BloomConfig;
pub use wallet_filter::{build_wallet_filter, WatchList, WatchedAddress, ELEMENT_SLACK};
