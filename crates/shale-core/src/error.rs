//! Error types for Shale Core

use thiserror::Error;

/// Result type alias using Shale's core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or loading migrations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid migration version: {0:?}")]
    InvalidVersion(String),

    #[error("Duplicate migration version: {0}")]
    DuplicateVersion(String),

    #[error("Migration source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
