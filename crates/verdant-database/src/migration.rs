//! Schema migrations bundled into the binary.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Apply every bundled migration the database has not seen yet.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    info!(bundled = MIGRATOR.iter().count(), "Running database migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Database,
            format!("Failed to run migrations: {e}"),
            e,
        )
    })?;

    info!("Database migrations completed");
    Ok(())
}

/// `(version, description)` of every bundled migration, oldest first.
pub fn bundled_migrations() -> Vec<(i64, String)> {
    MIGRATOR
        .iter()
        .map(|m| (m.version, m.description.to_string()))
        .collect()
}
