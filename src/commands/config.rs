//! Configuration inspection commands.

use clap::{Args, Subcommand};

use verdant_core::config::AppConfig;
use verdant_core::error::AppError;
use verdant_database::connection::mask_password;

use crate::output;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration, with the database password masked
    Show,
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, config: &AppConfig) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let mut shown = config.clone();
            shown.database.url = mask_password(&shown.database.url);
            output::print_json(&shown);
        }
    }
    Ok(())
}
