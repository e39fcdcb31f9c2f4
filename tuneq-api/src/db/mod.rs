//! Database access for tuneq-api
//!
//! One SQLite file in the root folder holds the `jobs` table.

pub mod jobs;

pub use jobs::{JobStore, StorePolicy};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Initialize database connection pool
///
/// WAL journaling lets readers proceed while a pipeline writes; writers
/// wait up to the busy timeout before SQLite reports a lock.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the `jobs` table if it doesn't exist
///
/// The CHECK constraints pin `result_url` to `ready` rows and
/// `error_detail` to `error` rows.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            key TEXT PRIMARY KEY,
            raw_query TEXT NOT NULL,
            resolved_term TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL CHECK (status IN ('processing', 'ready', 'error')),
            result_url TEXT,
            error_detail TEXT,
            attempt_id TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            claimed_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            CHECK ((status = 'ready') = (result_url IS NOT NULL)),
            CHECK ((status = 'error') = (error_detail IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (jobs)");

    Ok(())
}
