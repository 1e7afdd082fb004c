//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The record already exists, e.g. an account for a taken identifier.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing, unknown or expired auth token.
    #[error("unauthorized")]
    Unauthorized,

    /// The backend could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("migration error: {0}")]
    Migration(String),

    /// Blocking task failed to complete.
    #[error("task error: {0}")]
    Task(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
