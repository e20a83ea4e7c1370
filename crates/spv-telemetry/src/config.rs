//! Telemetry configuration from environment variables.

use std::env;

/// Logging setup for the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` expression).
    pub log_level: String,

    /// Whether to write logs to stdout at all.
    pub console_output: bool,

    /// JSON lines instead of human-readable output.
    pub json_logs: bool,

    /// Network label (mainnet, testnet, regtest).
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "spv-node".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            network: "mainnet".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SPV_SERVICE_NAME`: Service name (default: spv-node)
    /// - `SPV_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `SPV_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `SPV_JSON_LOGS`: Enable JSON logs (default: true inside containers)
    /// - `SPV_NETWORK`: Network label (default: mainnet)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("SPV_SERVICE_NAME").unwrap_or_else(|_| "spv-node".to_string()),

            log_level: env::var("SPV_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("SPV_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            json_logs: env::var("SPV_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            network: env::var("SPV_NETWORK").unwrap_or_else(|_| "mainnet".to_string()),
        }
    }

    /// Same as [`from_env`](Self::from_env) with the network label forced.
    pub fn for_network(network: &str) -> Self {
        let mut config = Self::from_env();
        config.network = network.to_string();
        config
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
