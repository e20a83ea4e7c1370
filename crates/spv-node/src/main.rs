use anyhow::Result;
use spv_node::{load_config, load_watch_list, NodeRuntime};
use spv_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

const STATUS_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let telemetry = TelemetryConfig::for_network(&format!("{:?}", config.network).to_lowercase());
    let _metrics = init_telemetry(&telemetry)?;

    let watch_list = load_watch_list()?;
    let runtime = NodeRuntime::start(config, watch_list).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    let mut status = tokio::time::interval(std::time::Duration::from_secs(STATUS_INTERVAL_SECS));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = status.tick() => {
                runtime.log_status().await?;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
