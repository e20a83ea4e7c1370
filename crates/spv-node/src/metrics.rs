//! Pool notifications mirrored into Prometheus gauges and counters.

use shared_types::hash_to_hex;
use spv_network::PoolNotification;
use spv_telemetry::{
    log_block_event, CHAIN_HEIGHT, CHAIN_TIP_CHANGES, PEERS_CONNECTED, SYNC_BLOCKS_REMAINING,
    SYNC_RUNS, TRANSACTIONS_SEEN,
};

/// Apply one notification to the metrics.
pub fn record_notification(notification: &PoolNotification) {
    match notification {
        PoolNotification::ChainChanged { height, hash } => {
            CHAIN_HEIGHT.set(i64::from(*height));
            CHAIN_TIP_CHANGES.inc();
            if SYNC_BLOCKS_REMAINING.get() > 0 {
                SYNC_BLOCKS_REMAINING.dec();
            }
            log_block_event!(debug, "node", "Chain tip changed", height, hash_to_hex(hash));
        }
        PoolNotification::TxSeen { .. } => TRANSACTIONS_SEEN.inc(),
        PoolNotification::SyncStarted { from, to } => {
            SYNC_RUNS.with_label_values(&["started"]).inc();
            SYNC_BLOCKS_REMAINING.set(i64::from((to - from).max(0)));
        }
        PoolNotification::SyncCompleted { height } => {
            SYNC_RUNS.with_label_values(&["completed"]).inc();
            SYNC_BLOCKS_REMAINING.set(0);
            CHAIN_HEIGHT.set(i64::from(*height));
        }
        PoolNotification::SyncFailed { .. } => {
            SYNC_RUNS.with_label_values(&["failed"]).inc();
        }
        PoolNotification::PeerCountChanged { connected } => {
            PEERS_CONNECTED.set(i64::try_from(*connected).unwrap_or(i64::MAX));
        }
    }
}
