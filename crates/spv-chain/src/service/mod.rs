//! # Service Layer
//!
//! `ChainState` implements `ChainStateApi` over any `BlockStore`.

pub mod chain_state;

pub use chain_state::ChainState;
