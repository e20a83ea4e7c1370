//! # SPV Sync Test Suite
//!
//! Cross-crate scenarios driving the real peer pool, sessions and chain state
//! against scripted remote nodes.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── support/          # Scripted remotes and the loopback network
//! │   │   ├── remote.rs
//! │   │   └── loopback.rs
//! │   └── integration/      # End-to-end sync scenarios
//! │       ├── filtered_sync.rs
//! │       ├── misbehaving_peer.rs
//! │       ├── publish.rs
//! │       └── node_runtime.rs
//! └── benches/
//!     └── sync_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All scenarios
//! cargo test -p spv-tests
//!
//! # One scenario family
//! cargo test -p spv-tests integration::publish::
//!
//! # Benchmarks
//! cargo bench -p spv-tests
//! ```

#![allow(dead_code)]

#[cfg(test)]
mod support;

#[cfg(test)]
mod integration;
