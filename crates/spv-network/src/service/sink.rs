//! Pool tasks and the handle producers use to queue them.

use std::sync::Arc;

use shared_types::Transaction;
use tokio::sync::oneshot;

use super::sequencer::{Sequencer, SequencerClosed};
use crate::domain::{PeerEvent, PeerId};
use crate::error::PublishError;
use crate::ports::PoolStatus;

/// One unit of work for the pool worker.
#[derive(Debug)]
pub enum PoolTask {
    Start,
    Stop,
    Peer {
        peer: PeerId,
        event: PeerEvent,
    },
    Publish {
        tx: Transaction,
        reply: oneshot::Sender<Result<(), PublishError>>,
    },
    WalletChanged,
    WatchdogFired {
        generation: u64,
    },
    Status {
        reply: oneshot::Sender<PoolStatus>,
    },
}

/// Cloneable producer side of the pool sequencer.
#[derive(Clone)]
pub struct EventSink {
    sequencer: Arc<Sequencer<PoolTask>>,
}

impl EventSink {
    pub fn new(sequencer: Arc<Sequencer<PoolTask>>) -> Self {
        Self { sequencer }
    }

    pub async fn submit(&self, task: PoolTask) -> Result<(), SequencerClosed> {
        self.sequencer.submit(task).await
    }

    /// Queue a session event; `false` once the pool has stopped.
    pub async fn peer_event(&self, peer: PeerId, event: PeerEvent) -> bool {
        self.submit(PoolTask::Peer { peer, event }).await.is_ok()
    }

    /// Tasks waiting for the worker.
    pub fn depth(&self) -> usize {
        self.sequencer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.sequencer.is_closed()
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("depth", &self.depth())
            .finish()
    }
}
