//! # Sequencer
//!
//! Single-worker FIFO with explicit backpressure. Producers block once the
//! queue reaches capacity and stay blocked until the worker has drained it
//! down to the low-water mark.

use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

/// Submitting to a closed sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Sequencer is closed")]
pub struct SequencerClosed;

struct QueueState<T> {
    queue: VecDeque<T>,
    /// Set when the queue filled up; cleared at the low-water mark.
    throttled: bool,
    closed: bool,
}

/// Bounded task queue consumed by exactly one worker.
pub struct Sequencer<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    low_water: usize,
    items: Notify,
    space: Notify,
}

impl<T> Sequencer<T> {
    pub fn new(capacity: usize, low_water: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::with_capacity(capacity),
                throttled: false,
                closed: false,
            }),
            capacity,
            low_water: low_water.min(capacity - 1),
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Queue `task`, waiting while the queue is throttled.
    pub async fn submit(&self, task: T) -> Result<(), SequencerClosed> {
        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(SequencerClosed);
                }
                if !state.throttled {
                    state.queue.push_back(task);
                    if state.queue.len() >= self.capacity {
                        state.throttled = true;
                    }
                    drop(state);
                    self.items.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Next task for the worker; `None` once closed and drained.
    pub async fn next(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(task) = state.queue.pop_front() {
                    if state.throttled && state.queue.len() <= self.low_water {
                        state.throttled = false;
                        drop(state);
                        self.space.notify_waiters();
                    }
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }
            self.items.notified().await;
        }
    }

    /// Refuse new tasks; the worker drains what is queued, then stops.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.items.notify_one();
        self.space.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_throttled(&self) -> bool {
        self.state.lock().throttled
    }
}
