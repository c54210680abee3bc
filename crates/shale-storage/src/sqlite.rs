//! SQLite dialect
//!
//! The "database" is a file. A database-less connection is an in-memory
//! connection, which selects the target by attaching the file read-write and
//! creates it with `VACUUM INTO`.

use crate::error::{StorageError, StorageResult};
use crate::traits::{DbConnection, Dialect, IsolationLevel};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// SQLite dialect targeting a database file
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    path: PathBuf,
    name: String,
}

impl SqliteDialect {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.to_string_lossy().into_owned();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `file:` URI for the database, opened read-write without creating it
    fn uri(&self) -> String {
        let mut uri = String::from("file:");
        for c in self.name.chars() {
            match c {
                '?' | '#' | '%' => {
                    let mut buf = [0u8; 4];
                    for b in c.encode_utf8(&mut buf).bytes() {
                        let _ = write!(uri, "%{:02X}", b);
                    }
                }
                _ => uri.push(c),
            }
        }
        uri.push_str("?mode=rw");
        uri
    }
}

/// An open SQLite connection
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// The underlying rusqlite connection
    pub fn inner(&self) -> &Connection {
        &self.conn
    }
}

impl DbConnection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> StorageResult<usize> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(self.conn.changes() as usize)
    }

    fn execute_with(&mut self, sql: &str, params: &[&str]) -> StorageResult<usize> {
        self.conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn query_pairs(&mut self, sql: &str) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let hash: String = row.get(1)?;
                Ok((key, hash))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row.map_err(|e| StorageError::Database(e.to_string()))?);
        }
        Ok(pairs)
    }

    fn begin(&mut self, isolation: IsolationLevel) -> StorageResult<()> {
        let sql = match isolation {
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1; BEGIN DEFERRED;",
            IsolationLevel::ReadCommitted => "PRAGMA read_uncommitted = 0; BEGIN DEFERRED;",
        };
        self.conn
            .execute_batch(sql)
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }
}

impl Dialect for SqliteDialect {
    type Conn = SqliteConnection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn database_name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> StorageResult<SqliteConnection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|e| StorageError::Connection(format!("{}: {}", self.name, e)))?;
        Ok(SqliteConnection { conn })
    }

    fn open_without_database(&self) -> StorageResult<SqliteConnection> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(SqliteConnection { conn })
    }

    fn table_exists(&self, conn: &mut SqliteConnection, table: &str) -> StorageResult<bool> {
        let count: i64 = conn
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    fn select_database_sql(&self) -> String {
        format!("ATTACH DATABASE {} AS target", quote_literal(&self.uri()))
    }

    fn create_database_sql(&self) -> String {
        format!("VACUUM INTO {}", quote_literal(&self.name))
    }

    /// Removes the database file and its journal files
    fn drop_database(&self, _conn: &mut SqliteConnection) -> StorageResult<()> {
        if !self.path.exists() {
            return Err(StorageError::Database(format!(
                "database {} does not exist",
                self.name
            )));
        }
        std::fs::remove_file(&self.path)?;
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut side = self.path.clone().into_os_string();
            side.push(suffix);
            let side = PathBuf::from(side);
            if side.exists() {
                std::fs::remove_file(&side)?;
            }
        }
        Ok(())
    }

    fn generate_sql_script(
        &self,
        conn: &mut SqliteConnection,
        include_data: bool,
    ) -> StorageResult<String> {
        let objects = schema_objects(&conn.conn)?;

        let mut statements = Vec::new();
        for (kind, name, sql) in objects.iter().filter(|(kind, _, _)| kind == "table") {
            statements.push(sql.clone());
            if include_data {
                statements.extend(table_inserts(&conn.conn, name)?);
            }
            tracing::trace!("Scripted {} {}", kind, name);
        }
        for (_, _, sql) in objects.iter().filter(|(kind, _, _)| kind != "table") {
            statements.push(sql.clone());
        }

        let mut script = String::new();
        for (i, statement) in statements.iter().enumerate() {
            if i > 0 {
                script.push_str("\nGO\n");
            }
            script.push_str(statement);
            script.push(';');
        }
        if !script.is_empty() {
            script.push('\n');
        }
        Ok(script)
    }
}

/// `(type, name, sql)` for every user object, tables first
fn schema_objects(conn: &Connection) -> StorageResult<Vec<(String, String, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT type, name, sql FROM sqlite_master \
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
             ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, name",
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let mut objects = Vec::new();
    for row in rows {
        objects.push(row.map_err(|e| StorageError::Database(e.to_string()))?);
    }
    Ok(objects)
}

fn table_inserts(conn: &Connection, table: &str) -> StorageResult<Vec<String>> {
    let quoted = quote_identifier(table);
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", quoted))
        .map_err(|e| StorageError::Database(e.to_string()))?;
    let columns = stmt.column_count();

    let mut rows = stmt
        .query([])
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let mut inserts = Vec::new();
    while let Some(row) = rows.next().map_err(|e| StorageError::Database(e.to_string()))? {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            let value = row
                .get_ref(i)
                .map_err(|e| StorageError::Database(e.to_string()))?;
            values.push(sql_literal(value));
        }
        inserts.push(format!("INSERT INTO {} VALUES ({})", quoted, values.join(", ")));
    }
    Ok(inserts)
}

fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => quote_literal(&String::from_utf8_lossy(bytes)),
        ValueRef::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dialect(temp: &TempDir) -> SqliteDialect {
        SqliteDialect::new(temp.path().join("app.db"))
    }

    #[test]
    fn test_open_missing_database_fails() {
        let temp = TempDir::new().unwrap();
        let err = dialect(&temp).open().err().unwrap();
        assert!(matches!(err, StorageError::Connection(_)));
        assert!(!temp.path().join("app.db").exists());
    }

    #[test]
    fn test_create_then_select_database() {
        let temp = TempDir::new().unwrap();
        let d = dialect(&temp);

        let mut conn = d.open_without_database().unwrap();
        assert!(conn.execute(&d.select_database_sql()).is_err());
        d.create_database(&mut conn).unwrap();
        assert!(temp.path().join("app.db").exists());

        let mut conn = d.open_without_database().unwrap();
        conn.execute(&d.select_database_sql()).unwrap();
        assert!(d.open().is_ok());
    }

    #[test]
    fn test_table_exists() {
        let temp = TempDir::new().unwrap();
        let d = dialect(&temp);
        d.create_database(&mut d.open_without_database().unwrap()).unwrap();

        let mut conn = d.open().unwrap();
        assert!(!d.table_exists(&mut conn, "ledger").unwrap());
        conn.execute(&d.create_table_sql("ledger")).unwrap();
        assert!(d.table_exists(&mut conn, "ledger").unwrap());
    }

    #[test]
    fn test_rollback_discards_ddl() {
        let temp = TempDir::new().unwrap();
        let d = dialect(&temp);
        d.create_database(&mut d.open_without_database().unwrap()).unwrap();

        let mut conn = d.open().unwrap();
        conn.begin(IsolationLevel::ReadUncommitted).unwrap();
        conn.execute("CREATE TABLE t (id INTEGER)").unwrap();
        conn.rollback().unwrap();
        assert!(!d.table_exists(&mut conn, "t").unwrap());
    }

    #[test]
    fn test_query_pairs_and_params() {
        let temp = TempDir::new().unwrap();
        let d = dialect(&temp);
        d.create_database(&mut d.open_without_database().unwrap()).unwrap();

        let mut conn = d.open().unwrap();
        conn.execute(&d.create_table_sql("ledger")).unwrap();
        let inserted = conn.execute_with(&d.insert_sql("ledger"), &["v1", "abc"]).unwrap();
        assert_eq!(inserted, 1);
        assert!(conn.execute_with(&d.insert_sql("ledger"), &["v1", "abc"]).is_err());

        let pairs = conn.query_pairs(&d.select_sql("ledger")).unwrap();
        assert_eq!(pairs, vec![("v1".to_string(), "abc".to_string())]);

        assert_eq!(conn.execute_with(&d.delete_sql("ledger"), &["v1"]).unwrap(), 1);
        assert_eq!(conn.execute_with(&d.delete_sql("ledger"), &["v1"]).unwrap(), 0);
    }

    #[test]
    fn test_generate_script_with_data() {
        let temp = TempDir::new().unwrap();
        let d = dialect(&temp);
        d.create_database(&mut d.open_without_database().unwrap()).unwrap();

        let mut conn = d.open().unwrap();
        conn.execute(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL, avatar BLOB);
             CREATE INDEX idx_people_name ON people(name);
             INSERT INTO people VALUES (1, 'O''Brien', 1.5, X'0A0B');
             INSERT INTO people VALUES (2, NULL, NULL, NULL);",
        )
        .unwrap();

        let schema = d.generate_sql_script(&mut conn, false).unwrap();
        assert!(schema.contains("CREATE TABLE people"));
        assert!(schema.contains("CREATE INDEX idx_people_name"));
        assert!(!schema.contains("INSERT INTO"));

        let full = d.generate_sql_script(&mut conn, true).unwrap();
        assert!(full.contains("INSERT INTO \"people\" VALUES (1, 'O''Brien', 1.5, X'0A0B')"));
        assert!(full.contains("INSERT INTO \"people\" VALUES (2, NULL, NULL, NULL)"));
        assert_eq!(shale_core::split_batches(&full).len(), 4);
    }

    #[test]
    fn test_drop_database_removes_file() {
        let temp = TempDir::new().unwrap();
        let d = dialect(&temp);
        let mut conn = d.open_without_database().unwrap();
        d.create_database(&mut conn).unwrap();
        d.drop_database(&mut conn).unwrap();
        assert!(!d.path().exists());
        assert!(d.drop_database(&mut conn).is_err());
    }

    #[test]
    fn test_uri_escapes_reserved_characters() {
        let d = SqliteDialect::new("/tmp/a?b#c%d.db");
        assert_eq!(d.uri(), "file:/tmp/a%3Fb%23c%25d.db?mode=rw");
    }
}
