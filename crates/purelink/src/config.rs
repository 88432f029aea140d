//! Glue between the global CLI flags and `purelink-config`.

use std::path::PathBuf;

use purelink_config::Config;
use purelink_core::BridgeConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `PURELINK_CONFIG`, else the default path.
pub fn path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(purelink_config::config_path)
}

/// Load the file (missing is fine) merged with `PURELINK_*` overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(purelink_config::load_config(Some(&path(global)))?)
}

/// Validate and resolve secrets into the runtime configuration.
pub fn bridge_config(cfg: &Config) -> Result<BridgeConfig, CliError> {
    Ok(purelink_config::to_bridge_config(cfg)?)
}
