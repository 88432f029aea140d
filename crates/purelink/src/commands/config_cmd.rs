//! Config subcommand handlers.

use purelink_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::path(global);
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let shown = purelink_config::redacted(&cfg)?;
            output::print_output(shown.trim_end(), global.quiet)
        }

        ConfigCommand::Path => output::print_output(&path.display().to_string(), global.quiet),

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            purelink_config::save_config(&Config::default(), &path)?;
            output::print_output(&format!("Wrote {}", path.display()), global.quiet)
        }
    }
}
