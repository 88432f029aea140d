//! Command dispatch: bridges CLI args to the core and formats output.

pub mod config_cmd;
pub mod discover;
pub mod inventory;
pub mod run;

use purelink_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs the loaded configuration.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run => run::handle(cfg).await,
        Command::Inventory => inventory::handle(cfg, global).await,
        Command::Discover(args) => discover::handle(cfg, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
