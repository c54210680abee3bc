//! Shale Storage - Ledger, execution engine and database dialects
//!
//! This crate applies and reverts migrations inside transactions, keeps the
//! tracking table up to date, and provides the SQLite and in-memory dialects.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod ledger;
pub mod repository;
pub mod traits;
pub mod transaction;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod memory;

pub use error::{StorageError, StorageResult};
pub use repository::{Repository, RepositoryConfig, DEFAULT_MIGRATIONS_DIR, DEFAULT_TABLE_NAME};
pub use traits::{DbConnection, Dialect, IsolationLevel};
pub use transaction::Transaction;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteDialect};

pub use memory::{MemoryConnection, MemoryDialect, MemoryServer};
