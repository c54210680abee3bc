//! The tracking table holding one `(key, hash)` row per applied migration

use crate::error::{StorageError, StorageResult};
use crate::traits::{DbConnection, Dialect};
use shale_core::{Migration, Version};
use std::collections::HashMap;

/// Create the tracking table
///
/// Fails with [`StorageError::SchemaConflict`] when the table already exists.
pub fn initialize<D: Dialect>(dialect: &D, conn: &mut D::Conn, table: &str) -> StorageResult<()> {
    if dialect.table_exists(conn, table)? {
        return Err(StorageError::SchemaConflict(format!(
            "tracking table {} already exists",
            table
        )));
    }
    conn.execute(&dialect.create_table_sql(table))?;
    tracing::info!("Created tracking table {}", table);
    Ok(())
}

/// Read every ledger entry into a version → hash map
pub fn read_all<D: Dialect>(
    dialect: &D,
    conn: &mut D::Conn,
    table: &str,
) -> StorageResult<HashMap<Version, String>> {
    let rows = conn
        .query_pairs(&dialect.select_sql(table))
        .map_err(|e| StorageError::Ledger(format!("failed to read {}: {}", table, e)))?;

    let mut ledger = HashMap::with_capacity(rows.len());
    for (key, hash) in rows {
        let version = Version::new(key.trim())
            .map_err(|e| StorageError::Ledger(format!("bad row in {}: {}", table, e)))?;
        ledger.insert(version, hash.trim().to_string());
    }
    Ok(ledger)
}

/// Insert the ledger entry for a migration
pub fn record<D: Dialect>(
    dialect: &D,
    conn: &mut D::Conn,
    table: &str,
    migration: &Migration,
) -> StorageResult<()> {
    conn.execute_with(
        &dialect.insert_sql(table),
        &[migration.version().as_str(), migration.hash()],
    )
    .map_err(|e| {
        StorageError::Ledger(format!(
            "failed to record migration {}: {}",
            migration.version(),
            e
        ))
    })?;
    Ok(())
}

/// Delete the ledger entry for a version, returning the number of rows removed
pub fn remove<D: Dialect>(
    dialect: &D,
    conn: &mut D::Conn,
    table: &str,
    version: &Version,
) -> StorageResult<usize> {
    conn.execute_with(&dialect.delete_sql(table), &[version.as_str()])
        .map_err(|e| StorageError::Ledger(format!("failed to remove migration {}: {}", version, e)))
}

/// Drop the tracking table
pub fn drop_table<D: Dialect>(dialect: &D, conn: &mut D::Conn, table: &str) -> StorageResult<()> {
    conn.execute(&dialect.drop_table_sql(table))?;
    tracing::info!("Dropped tracking table {}", table);
    Ok(())
}
