//! `purelink discover`: one local network sweep.

use std::collections::HashSet;
use std::sync::Arc;

use tabled::Tabled;
use tracing::info;

use purelink_config::Config;
use purelink_core::NetworkLocation;
use purelink_core::discovery::{Discovery, SystemProbe};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::inventory;

#[derive(Tabled)]
struct LocationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: u16,
}

impl From<&NetworkLocation> for LocationRow {
    fn from(l: &NetworkLocation) -> Self {
        Self {
            id: l.device_id.clone(),
            address: l.address.to_string(),
            port: l.port,
        }
    }
}

pub async fn handle(cfg: &Config, args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = purelink_config::discovery_settings(&cfg.discovery)?;

    let ids: HashSet<String> = if args.ids.is_empty() {
        inventory::fetch(cfg)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect()
    } else {
        args.ids.into_iter().map(|id| id.to_uppercase()).collect()
    };
    info!(devices = ids.len(), "scanning local network");

    let discovery = Discovery::new(Arc::new(SystemProbe), settings);
    let mut found: Vec<NetworkLocation> = discovery.locate(&ids).await?.into_values().collect();
    found.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    let out = output::render_list(
        global.output,
        &found,
        |l| LocationRow::from(l),
        |l| l.address.to_string(),
    )?;
    output::print_output(&out, global.quiet)
}
