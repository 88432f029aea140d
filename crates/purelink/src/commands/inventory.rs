//! `purelink inventory`: one cloud inventory fetch.

use tabled::Tabled;

use purelink_config::Config;
use purelink_core::{CloudInventory, DeviceRecord};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Type")]
    device_type: String,
}

impl From<&DeviceRecord> for DeviceRow {
    fn from(d: &DeviceRecord) -> Self {
        Self {
            id: d.id.clone(),
            name: d.display_name.clone(),
            model: format!("{} ({})", d.model.descriptor().name, d.model_number()),
            device_type: d.device_type.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

/// Log in if needed and fetch the supported devices, sorted by id.
pub async fn fetch(cfg: &Config) -> Result<Vec<DeviceRecord>, CliError> {
    let bridge = config::bridge_config(cfg)?;
    let inventory =
        CloudInventory::from_settings(&bridge.cloud, bridge.account, bridge.device_types)?;
    if !inventory.has_credentials().await {
        inventory.login().await?;
    }

    let mut devices: Vec<DeviceRecord> = inventory.fetch().await?.into_values().collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(devices)
}

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = fetch(cfg).await?;
    let out = output::render_list(
        global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet)
}
