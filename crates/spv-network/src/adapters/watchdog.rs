//! Watchdog timers backed by the tokio clock.

use std::time::Duration;

use tracing::trace;

use crate::ports::WatchdogScheduler;
use crate::service::{EventSink, PoolTask};

/// Spawns one sleeping task per armed generation. Stale generations are
/// ignored by the pool, so nothing is ever cancelled.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioWatchdog;

impl WatchdogScheduler for TokioWatchdog {
    fn schedule(&self, generation: u64, after: Duration, sink: EventSink) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            trace!(generation, "Sync watchdog expired");
            let _ = sink.submit(PoolTask::WatchdogFired { generation }).await;
        });
    }
}
