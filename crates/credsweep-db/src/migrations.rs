//! Database migration management.
//!
//! Embeds SQL migrations and provides functions to apply them automatically.

use crate::error::{DatabaseError, Result};
use sqlx::{Pool, Sqlite};

/// Run all pending database migrations.
///
/// # Errors
/// Returns `DatabaseError::Migration` if any migration fails to execute.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration execution failed: {e}")))?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Get the current schema version.
///
/// Returns 0 if no migrations have been applied yet.
pub async fn get_schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let table_exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?
        > 0;

    if !table_exists {
        return Ok(0);
    }

    let version =
        sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations")
            .fetch_optional(pool)
            .await?
            .unwrap_or(0);

    Ok(version)
}
