//! Error types for the network layer

use shared_types::DecodeError;
use spv_chain::ConsensusError;
use thiserror::Error;

use crate::domain::DisconnectReason;

/// Violations that end a single connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed {command} payload: {source}")]
    Decode {
        command: String,
        #[source]
        source: DecodeError,
    },

    #[error("Wrong network magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("Payload of {len} bytes exceeds the {max} byte frame limit")]
    OversizedPayload { len: usize, max: usize },

    #[error("Checksum mismatch for {command}")]
    BadChecksum { command: String },

    #[error("Incompatible peer: {0}")]
    Incompatible(String),

    #[error("Unexpected {0} message")]
    Unexpected(String),

    #[error("Peer sent {count} consecutive irrelevant transactions")]
    Flooding { count: u32 },

    #[error("Consensus failure: {0}")]
    Consensus(#[from] ConsensusError),
}

impl ProtocolError {
    /// How the connection ends for this error.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            ProtocolError::Incompatible(_) => DisconnectReason::Incompatible,
            _ => DisconnectReason::ProtocolViolation,
        }
    }
}

/// Failures surfaced by the peer pool handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Peer pool is stopped")]
    Stopped,

    #[error("Synchronization failed after {failures} connection failures")]
    SyncFailed { failures: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a transaction could not be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Transaction is not fully signed")]
    Unsigned,

    #[error("Peer pool is stopped")]
    PoolStopped,
}
