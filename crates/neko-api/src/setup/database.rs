//! Database setup and initialization

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use neko_core::Config;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open the index in WAL mode and apply pending migrations.
pub async fn setup_database(config: &Config) -> Result<SqlitePool> {
    tracing::info!(path = %config.database_path.display(), "Opening metadata index");

    let options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    // SQLite serializes writers itself; a small pool keeps readers
    // non-blocking without fan-out.
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
