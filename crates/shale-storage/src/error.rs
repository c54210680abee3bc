//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Migration {version} failed in batch {batch}: {message}")]
    Execution {
        version: String,
        batch: usize,
        message: String,
    },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Drift detected in migrations: {}", .0.join(", "))]
    DriftDetected(Vec<String>),

    #[error("Unknown migration version: {0}")]
    UnknownVersion(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] shale_core::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] ::rusqlite::Error),
}
