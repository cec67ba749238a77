//! Credsweep Database Layer
//!
//! Provides `SQLite` storage for scan runs and the findings they produce,
//! using `SQLx` with embedded migrations.
//!
//! # Example
//!
//! ```ignore
//! use credsweep_db::Database;
//!
//! let db = Database::new("credsweep.db").await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod findings;
pub mod migrations;
pub mod runs;

// Re-export commonly used types
pub use error::{DatabaseError, Result};
pub use findings::StoredFinding;
pub use runs::ScanRun;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// High-level database handle.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the database at `path`. Use `:memory:` for an
    /// in-memory database.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
        })?;

        let connect_options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::Open(format!("failed to open {path_str}: {e}")))?;

        tracing::info!("Database pool created at {}", path_str);

        Ok(Self { pool })
    }

    /// Open the database and bring its schema up to date.
    pub async fn open_and_migrate(path: impl AsRef<Path>) -> Result<Self> {
        let db = Self::new(path).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
