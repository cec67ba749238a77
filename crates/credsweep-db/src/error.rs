//! Database error types.

use thiserror::Error;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create database connection.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Database record with provided identifier not found.
    #[error("{0}")]
    NotFound(String),

    /// Failed to decode database value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
