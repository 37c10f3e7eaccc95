//! Database migration management commands.

use clap::{Args, Subcommand};

use verdant_core::config::AppConfig;
use verdant_core::error::AppError;
use verdant_database::migration;

use crate::output;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// List the migrations bundled into this binary
    List,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            let db = super::connect(config).await?;
            println!("Running database migrations...");
            let applied = migration::run_migrations(db.pool()).await;
            db.close().await;
            applied?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::List => {
            for (version, description) in migration::bundled_migrations() {
                output::print_kv(&version.to_string(), &description);
            }
        }
    }

    Ok(())
}
