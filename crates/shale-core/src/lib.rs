//! Shale Core - Migration model for the Shale migration engine
//!
//! This crate provides the migration record, batch splitting, migration
//! sources, and the reconciliation of on-disk migrations with the
//! applied-migration ledger. It performs no database I/O.

pub mod batch;
pub mod error;
pub mod migration;
pub mod set;
pub mod source;

pub use batch::{split_batches, BATCH_SEPARATOR};
pub use error::{Error, Result};
pub use migration::{compute_hash, Migration, Version};
pub use set::{MigrationEntry, MigrationSet, MigrationStatus};
pub use source::{DirectorySource, MigrationSource};
