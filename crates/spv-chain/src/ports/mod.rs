//! # Ports Layer
//!
//! Inbound (API) and outbound (dependency) traits.

pub mod inbound;
pub mod outbound;

pub use inbound::{ChainStateApi, HeaderBatchOutcome};
pub use outbound::{
    BlockStore, FixedTimeSource, InMemoryBlockStore, StoreOp, SystemTimeSource, TimeSource,
};
