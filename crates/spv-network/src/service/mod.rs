//! # Service Layer
//!
//! The sequencer every pool mutation flows through, the sans-IO peer session
//! and the pool that coordinates sessions with the chain.

pub mod pool;
pub mod sequencer;
pub mod session;
pub mod sink;

pub use pool::{PeerPool, PoolHandle, PoolPorts, HEADERS_ONLY_MARGIN_SECS};
pub use sequencer::{Sequencer, SequencerClosed};
pub use session::{PeerSession, SessionOutput};
pub use sink::{EventSink, PoolTask};
