//! # SPV Telemetry
//!
//! Logging and metrics for the sync node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spv_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let metrics = init_telemetry(&TelemetryConfig::from_env())?;
//! spv_telemetry::PEERS_CONNECTED.set(4);
//! println!("{}", metrics.encode()?);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SPV_SERVICE_NAME` | `spv-node` | Service name on log lines |
//! | `SPV_LOG_LEVEL` | `info` | Log filter, `RUST_LOG` takes precedence |
//! | `SPV_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `SPV_JSON_LOGS` | `false` | JSON lines (default on in containers) |
//! | `SPV_NETWORK` | `mainnet` | Network label |

#![warn(clippy::all)]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CHAIN_HEIGHT, CHAIN_TIP_CHANGES,
    PEERS_CONNECTED, REGISTRY, SEQUENCER_DEPTH, SYNC_BLOCKS_REMAINING, SYNC_RUNS,
    TRANSACTIONS_SEEN,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics, then install the log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<MetricsHandle, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(config)?;
    Ok(metrics)
}
