//! CLI command definitions and dispatch.

pub mod config;
pub mod migrate;
pub mod suggestion;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use verdant_core::config::AppConfig;
use verdant_core::error::AppError;
use verdant_database::{DatabasePool, PgSuggestionRepository, PgVegetableRepository};
use verdant_service::SuggestionService;

use crate::output::OutputFormat;

/// Verdant: community-edited vegetable catalogue
#[derive(Debug, Parser)]
#[command(name = "verdant", version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (defaults to config/ for VERDANT_ENV)
    #[arg(short, long, env = "VERDANT_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Edit suggestion workflow
    Suggestion(suggestion::SuggestionArgs),
    /// Configuration inspection
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Suggestion(args) => suggestion::execute(args, &config, self.format).await,
            Commands::Config(args) => config::execute(args, &config),
        }
    }
}

/// Helper: connect to the configured database
pub async fn connect(config: &AppConfig) -> Result<DatabasePool, AppError> {
    let db = DatabasePool::connect(&config.database).await?;
    if !db.health_check().await? {
        db.close().await;
        return Err(AppError::database("Database did not answer the health check"));
    }
    Ok(db)
}

/// Helper: build the suggestion service over PostgreSQL and blob storage
pub async fn build_service(
    config: &AppConfig,
    db: &DatabasePool,
) -> Result<SuggestionService, AppError> {
    let storage = verdant_storage::from_config(&config.storage).await?;
    Ok(SuggestionService::new(
        Arc::new(PgVegetableRepository::new(db.pool().clone())),
        Arc::new(PgSuggestionRepository::new(db.pool().clone())),
        storage,
        &config.suggestion,
        &config.storage,
    ))
}
