//! End-to-end sync scenarios.
//!
//! The loopback scenarios run the pool and sessions in-process with
//! [`crate::support::Loopback`]; `node_runtime` goes over real sockets.

mod filtered_sync;
mod misbehaving_peer;
mod node_runtime;
mod publish;
