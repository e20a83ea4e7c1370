//! Prometheus metrics for the sync node.
//!
//! All metrics follow the naming convention: `spv_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CHAIN
    // =========================================================================

    /// Height of the best chain
    pub static ref CHAIN_HEIGHT: IntGauge = IntGauge::new(
        "spv_chain_height",
        "Height of the best header chain"
    ).expect("metric creation failed");

    /// Tip changes, including reorgs
    pub static ref CHAIN_TIP_CHANGES: IntCounter = IntCounter::new(
        "spv_chain_tip_changes_total",
        "Number of times the best tip moved"
    ).expect("metric creation failed");

    // =========================================================================
    // SYNC
    // =========================================================================

    /// Sync runs by outcome
    pub static ref SYNC_RUNS: IntCounterVec = IntCounterVec::new(
        Opts::new("spv_sync_runs_total", "Sync runs"),
        &["outcome"]  // outcome: started/completed/failed
    ).expect("metric creation failed");

    /// Blocks still to download in the current run
    pub static ref SYNC_BLOCKS_REMAINING: IntGauge = IntGauge::new(
        "spv_sync_blocks_remaining",
        "Blocks between the local tip and the sync target"
    ).expect("metric creation failed");

    // =========================================================================
    // PEERS
    // =========================================================================

    /// Connected peers
    pub static ref PEERS_CONNECTED: IntGauge = IntGauge::new(
        "spv_peers_connected",
        "Number of peers past the handshake"
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Relay confirmations of wallet transactions
    pub static ref TRANSACTIONS_SEEN: IntCounter = IntCounter::new(
        "spv_transactions_seen_total",
        "Wallet transactions announced back by a peer"
    ).expect("metric creation failed");

    // =========================================================================
    // SEQUENCER
    // =========================================================================

    /// Tasks waiting for the pool worker
    pub static ref SEQUENCER_DEPTH: IntGauge = IntGauge::new(
        "spv_sequencer_depth",
        "Pool tasks queued for the sequencer worker"
    ).expect("metric creation failed");
}

/// Proof that the metrics are registered.
#[derive(Debug)]
pub struct MetricsHandle {
    _private: (),
}

impl MetricsHandle {
    /// Current metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        encode_metrics()
    }
}

/// Register all metrics with the global registry. Calling it again is a no-op.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CHAIN_HEIGHT.clone()),
        Box::new(CHAIN_TIP_CHANGES.clone()),
        Box::new(SYNC_RUNS.clone()),
        Box::new(SYNC_BLOCKS_REMAINING.clone()),
        Box::new(PEERS_CONNECTED.clone()),
        Box::new(TRANSACTIONS_SEEN.clone()),
        Box::new(SEQUENCER_DEPTH.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
