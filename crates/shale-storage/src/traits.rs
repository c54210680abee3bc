//! Database transport and dialect trait definitions

use crate::error::StorageResult;

/// Transaction isolation levels understood by the dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Relaxed level used while applying schema changes
    ReadUncommitted,
    #[default]
    ReadCommitted,
}

/// An open connection to a database server
///
/// Connections are scoped values: dropping one closes it, and dropping it
/// inside an unfinished transaction rolls that transaction back.
pub trait DbConnection {
    /// Execute one or more statements, returning the number of affected rows
    fn execute(&mut self, sql: &str) -> StorageResult<usize>;

    /// Execute a single statement with positional text parameters (`?1`, `?2`, ...)
    fn execute_with(&mut self, sql: &str, params: &[&str]) -> StorageResult<usize>;

    /// Run a query whose first two columns are text, returning them as pairs
    fn query_pairs(&mut self, sql: &str) -> StorageResult<Vec<(String, String)>>;

    /// Begin a transaction
    fn begin(&mut self, isolation: IsolationLevel) -> StorageResult<()>;

    /// Commit the open transaction
    fn commit(&mut self) -> StorageResult<()>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> StorageResult<()>;
}

/// The database-specific capability set
///
/// The SQL helpers default to ANSI text; a dialect overrides what its
/// database spells differently.
pub trait Dialect {
    type Conn: DbConnection;

    /// Dialect identifier for logging
    fn name(&self) -> &'static str;

    /// Name of the target database
    fn database_name(&self) -> &str;

    /// Open a connection to the target database
    fn open(&self) -> StorageResult<Self::Conn>;

    /// Open a connection with no database selected
    ///
    /// Used for statements that must work while the target database does
    /// not exist yet.
    fn open_without_database(&self) -> StorageResult<Self::Conn>;

    /// Whether the tracking table exists (absence is `Ok(false)`)
    fn table_exists(&self, conn: &mut Self::Conn, table: &str) -> StorageResult<bool>;

    /// Dialect-specific schema (and optionally data) snapshot of the target database
    fn generate_sql_script(&self, conn: &mut Self::Conn, include_data: bool)
        -> StorageResult<String>;

    // ─────────────────────────────────────────────────────────────────────────
    // Database lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Statement that switches a database-less connection to the target
    fn select_database_sql(&self) -> String {
        format!("USE {}", self.database_name())
    }

    fn create_database_sql(&self) -> String {
        format!("CREATE DATABASE {}", self.database_name())
    }

    fn drop_database_sql(&self) -> String {
        format!("DROP DATABASE {}", self.database_name())
    }

    /// Create the target database over a database-less connection
    fn create_database(&self, conn: &mut Self::Conn) -> StorageResult<()> {
        conn.execute(&self.create_database_sql())?;
        Ok(())
    }

    /// Drop the target database over a database-less connection
    fn drop_database(&self, conn: &mut Self::Conn) -> StorageResult<()> {
        conn.execute(&self.drop_database_sql())?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tracking table
    // ─────────────────────────────────────────────────────────────────────────

    fn create_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\"key\" VARCHAR(255) NOT NULL PRIMARY KEY, \"hash\" VARCHAR(64) NOT NULL)",
            table
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", table)
    }

    fn select_sql(&self, table: &str) -> String {
        format!("SELECT \"key\", \"hash\" FROM {}", table)
    }

    fn insert_sql(&self, table: &str) -> String {
        format!("INSERT INTO {} (\"key\", \"hash\") VALUES (?1, ?2)", table)
    }

    fn delete_sql(&self, table: &str) -> String {
        format!("DELETE FROM {} WHERE \"key\" = ?1", table)
    }
}
