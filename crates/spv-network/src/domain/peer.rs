//! # Peer Entities
//!
//! Identity, lifecycle state and the download-peer election rule.

use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Pool-local peer identifier, increasing in connection order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Closed normally; the address may be retried.
    Normal,
    /// Socket inactivity or watchdog expiry.
    Timeout,
    /// Malformed data or misbehaviour.
    ProtocolViolation,
    /// Version or services unusable; never retried.
    Incompatible,
}

/// What the handshake told us about a connected peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub address: SocketAddr,
    pub version: i32,
    pub services: u64,
    pub user_agent: String,
    /// Chain height advertised in `version`.
    pub height: i32,
}

/// Round-trip estimate, exponentially smoothed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PingEstimate {
    millis: Option<f64>,
}

impl PingEstimate {
    /// Smoothing weight of the newest sample.
    pub const ALPHA: f64 = 0.5;

    pub fn update(&mut self, sample_ms: f64) -> f64 {
        let next = match self.millis {
            Some(current) => current * (1.0 - Self::ALPHA) + sample_ms * Self::ALPHA,
            None => sample_ms,
        };
        self.millis = Some(next);
        next
    }

    pub fn millis(&self) -> Option<f64> {
        self.millis
    }
}

/// A connected peer as seen by the election.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub id: PeerId,
    pub height: i32,
    pub ping_ms: Option<f64>,
}

impl Candidate {
    /// `Greater` when `self` is the strictly better download peer.
    ///
    /// Higher advertised height wins; equal heights go to the lower ping, and
    /// a measured ping beats an unmeasured one.
    pub fn rank(&self, other: &Candidate) -> Ordering {
        self.height.cmp(&other.height).then_with(|| {
            match (self.ping_ms, other.ping_ms) {
                (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            }
        })
    }
}

/// Pick the download peer among `candidates`.
///
/// The `current` peer keeps the role unless someone ranks strictly above it.
pub fn elect_download_peer(candidates: &[Candidate], current: Option<PeerId>) -> Option<PeerId> {
    let best = candidates.iter().fold(None::<&Candidate>, |best, c| match best {
        Some(b) if c.rank(b) != Ordering::Greater => Some(b),
        _ => Some(c),
    })?;

    match current.and_then(|id| candidates.iter().find(|c| c.id == id)) {
        Some(incumbent) if best.rank(incumbent) != Ordering::Greater => Some(incumbent.id),
        _ => Some(best.id),
    }
}
