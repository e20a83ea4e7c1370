//! # Domain Layer
//!
//! Wire messages and framing, peer entities, events and relay bookkeeping.
//! Nothing here performs I/O.

pub mod alert;
pub mod events;
pub mod framing;
pub mod messages;
pub mod peer;
pub mod relay;

pub use alert::verify_alert;
pub use events::{PeerEvent, PoolNotification, SessionCommand};
pub use framing::{FrameCodec, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use messages::{
    AlertMessage, InvItem, InvType, LocatorRequest, MerkleBlockMessage, Message, NetAddress,
    RejectMessage, VersionMessage, MAX_BLOCKS_INV, MAX_HEADERS, MAX_INV_ITEMS, MAX_LOCATOR_HASHES,
    NODE_NETWORK, PROTOCOL_VERSION,
};
pub use peer::{
    elect_download_peer, Candidate, DisconnectReason, PeerId, PeerInfo, PeerState, PingEstimate,
};
pub use relay::RelayTracker;
