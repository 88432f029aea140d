//! `purelink run`: the long-running bridge.

use std::sync::Arc;

use tracing::info;

use purelink_config::Config;
use purelink_core::Bridge;

use crate::config;
use crate::error::CliError;
use crate::platform::StdioPlatform;

pub async fn handle(cfg: &Config) -> Result<(), CliError> {
    let bridge_config = config::bridge_config(cfg)?;
    let bridge = Bridge::new(bridge_config, Arc::new(StdioPlatform::stdio()))?;

    bridge.start().await;
    info!("bridge running, Ctrl-C to stop");

    let interrupted = tokio::signal::ctrl_c().await;
    info!("shutting down");
    bridge.shutdown().await;
    interrupted?;
    Ok(())
}
