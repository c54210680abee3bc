//! In-memory dialect for testing
//!
//! A [`MemoryServer`] holds named databases made of tables and rows. It
//! understands the statements the engine itself issues plus plain
//! `CREATE TABLE`, `DROP TABLE`, `INSERT INTO`, `DELETE FROM`, and `SELECT`.
//! Any other statement fails, which makes scripts easy to break on purpose.
//! The server counts open connections so tests can assert nothing leaks.

use crate::error::{StorageError, StorageResult};
use crate::traits::{DbConnection, Dialect, IsolationLevel};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    definition: String,
    keyed: bool,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    tables: BTreeMap<String, MemoryTable>,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, MemoryDatabase>,
    open_connections: usize,
    offline: bool,
}

/// A shared in-process database server
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, ServerState>> {
        self.state
            .lock()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    /// Number of connections currently open
    pub fn open_connections(&self) -> usize {
        self.lock().map(|s| s.open_connections).unwrap_or(0)
    }

    /// Refuse every new connection while set
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.lock() {
            state.offline = offline;
        }
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.lock()
            .map(|s| s.databases.contains_key(database))
            .unwrap_or(false)
    }

    /// Table names of a database, sorted
    pub fn table_names(&self, database: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|s| {
                s.databases
                    .get(database)
                    .map(|db| db.tables.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    /// Row count of a table, if it exists
    pub fn row_count(&self, database: &str, table: &str) -> Option<usize> {
        let state = self.lock().ok()?;
        state
            .databases
            .get(database)?
            .tables
            .get(table)
            .map(|t| t.rows.len())
    }

    fn connect(&self, database: Option<&str>) -> StorageResult<MemoryConnection> {
        let mut state = self.lock()?;
        if state.offline {
            return Err(StorageError::Connection("server is offline".to_string()));
        }
        if let Some(name) = database {
            if !state.databases.contains_key(name) {
                return Err(StorageError::Connection(format!(
                    "database {} does not exist",
                    name
                )));
            }
        }
        state.open_connections += 1;
        Ok(MemoryConnection {
            server: self.clone(),
            database: database.map(str::to_string),
            snapshot: None,
        })
    }
}

/// Result of one statement
enum Outcome {
    Changed(usize),
    Rows(Vec<Vec<String>>),
}

/// A connection to a [`MemoryServer`]
pub struct MemoryConnection {
    server: MemoryServer,
    database: Option<String>,
    snapshot: Option<MemoryDatabase>,
}

impl MemoryConnection {
    fn current(&self) -> StorageResult<&str> {
        self.database
            .as_deref()
            .ok_or_else(|| StorageError::Connection("no database selected".to_string()))
    }

    fn has_table(&self, table: &str) -> StorageResult<bool> {
        let name = self.current()?;
        let state = self.server.lock()?;
        Ok(state
            .databases
            .get(name)
            .map(|db| db.tables.contains_key(table))
            .unwrap_or(false))
    }

    fn script(&self, include_data: bool) -> StorageResult<String> {
        let name = self.current()?;
        let state = self.server.lock()?;
        let db = state
            .databases
            .get(name)
            .ok_or_else(|| StorageError::Connection(format!("database {} does not exist", name)))?;

        let mut statements = Vec::new();
        for (table_name, table) in &db.tables {
            statements.push(table.definition.clone());
            if include_data {
                for row in &table.rows {
                    let values: Vec<String> = row
                        .iter()
                        .map(|v| format!("'{}'", v.replace('\'', "''")))
                        .collect();
                    statements.push(format!(
                        "INSERT INTO {} VALUES ({})",
                        table_name,
                        values.join(", ")
                    ));
                }
            }
        }
        Ok(statements.join("\nGO\n"))
    }

    fn run(&mut self, statement: &str, params: &[&str]) -> StorageResult<Outcome> {
        let words: Vec<&str> = statement.split_whitespace().collect();
        let keyword = |i: usize, expected: &str| {
            words
                .get(i)
                .map(|w| w.eq_ignore_ascii_case(expected))
                .unwrap_or(false)
        };
        let object = |i: usize| -> StorageResult<String> {
            words
                .get(i)
                .map(|w| object_name(w))
                .filter(|w| !w.is_empty())
                .ok_or_else(|| StorageError::Database(format!("missing name in: {}", statement)))
        };

        if keyword(0, "USE") {
            let name = object(1)?;
            if !self.server.has_database(&name) {
                return Err(StorageError::Database(format!("database {} does not exist", name)));
            }
            self.database = Some(name);
            return Ok(Outcome::Changed(0));
        }

        let mut state = self.server.lock()?;

        if keyword(0, "CREATE") && keyword(1, "DATABASE") {
            let name = object(2)?;
            if state.databases.contains_key(&name) {
                return Err(StorageError::Database(format!("database {} already exists", name)));
            }
            state.databases.insert(name, MemoryDatabase::default());
            return Ok(Outcome::Changed(0));
        }
        if keyword(0, "DROP") && keyword(1, "DATABASE") {
            let name = object(2)?;
            if state.databases.remove(&name).is_none() {
                return Err(StorageError::Database(format!("database {} does not exist", name)));
            }
            return Ok(Outcome::Changed(0));
        }
        if keyword(0, "SELECT") && !words.iter().any(|w| w.eq_ignore_ascii_case("FROM")) {
            return Ok(Outcome::Rows(Vec::new()));
        }

        let current = self.current()?.to_string();
        let db = state
            .databases
            .get_mut(&current)
            .ok_or_else(|| StorageError::Connection(format!("database {} does not exist", current)))?;

        if keyword(0, "CREATE") && keyword(1, "TABLE") {
            let name = object(2)?;
            if db.tables.contains_key(&name) {
                return Err(StorageError::Database(format!("table {} already exists", name)));
            }
            let keyed = statement.to_ascii_uppercase().contains("PRIMARY KEY");
            db.tables.insert(
                name,
                MemoryTable {
                    definition: statement.to_string(),
                    keyed,
                    rows: Vec::new(),
                },
            );
            return Ok(Outcome::Changed(0));
        }
        if keyword(0, "DROP") && keyword(1, "TABLE") {
            let name = object(2)?;
            if db.tables.remove(&name).is_none() {
                return Err(StorageError::Database(format!("no such table: {}", name)));
            }
            return Ok(Outcome::Changed(0));
        }
        if keyword(0, "INSERT") && keyword(1, "INTO") {
            let name = object(2)?;
            let table = db
                .tables
                .get_mut(&name)
                .ok_or_else(|| StorageError::Database(format!("no such table: {}", name)))?;
            let row: Vec<String> = if params.is_empty() {
                vec![statement.to_string()]
            } else {
                params.iter().map(|p| p.to_string()).collect()
            };
            if table.keyed && table.rows.iter().any(|r| r.first() == row.first()) {
                return Err(StorageError::Database(format!(
                    "UNIQUE constraint failed: {}",
                    name
                )));
            }
            table.rows.push(row);
            return Ok(Outcome::Changed(1));
        }
        if keyword(0, "DELETE") && keyword(1, "FROM") {
            let name = object(2)?;
            let table = db
                .tables
                .get_mut(&name)
                .ok_or_else(|| StorageError::Database(format!("no such table: {}", name)))?;
            let before = table.rows.len();
            match params.first() {
                Some(key) => table.rows.retain(|r| r.first().map(String::as_str) != Some(*key)),
                None => table.rows.clear(),
            }
            return Ok(Outcome::Changed(before - table.rows.len()));
        }
        if keyword(0, "SELECT") {
            let from = words
                .iter()
                .position(|w| w.eq_ignore_ascii_case("FROM"))
                .unwrap_or(0);
            let name = object(from + 1)?;
            let table = db
                .tables
                .get(&name)
                .ok_or_else(|| StorageError::Database(format!("no such table: {}", name)))?;
            return Ok(Outcome::Rows(table.rows.clone()));
        }

        Err(StorageError::Database(format!(
            "unsupported statement: {}",
            statement.lines().next().unwrap_or_default()
        )))
    }

    fn run_all(&mut self, sql: &str, params: &[&str]) -> StorageResult<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            outcomes.push(self.run(statement, params)?);
        }
        Ok(outcomes)
    }
}

/// Strip quoting and a trailing column list from an object name
fn object_name(word: &str) -> String {
    let name = word.split('(').next().unwrap_or_default();
    name.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_string()
}

impl DbConnection for MemoryConnection {
    fn execute(&mut self, sql: &str) -> StorageResult<usize> {
        self.execute_with(sql, &[])
    }

    fn execute_with(&mut self, sql: &str, params: &[&str]) -> StorageResult<usize> {
        let changed = self
            .run_all(sql, params)?
            .into_iter()
            .map(|o| match o {
                Outcome::Changed(n) => n,
                Outcome::Rows(_) => 0,
            })
            .sum();
        Ok(changed)
    }

    fn query_pairs(&mut self, sql: &str) -> StorageResult<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for outcome in self.run_all(sql, &[])? {
            if let Outcome::Rows(rows) = outcome {
                for row in rows {
                    if let [key, hash] = row.as_slice() {
                        pairs.push((key.clone(), hash.clone()));
                    }
                }
            }
        }
        Ok(pairs)
    }

    fn begin(&mut self, _isolation: IsolationLevel) -> StorageResult<()> {
        if self.snapshot.is_some() {
            return Err(StorageError::Transaction("transaction already open".to_string()));
        }
        let name = self.current()?.to_string();
        let state = self.server.lock()?;
        let db = state
            .databases
            .get(&name)
            .cloned()
            .ok_or_else(|| StorageError::Connection(format!("database {} does not exist", name)))?;
        drop(state);
        self.snapshot = Some(db);
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::Transaction("no open transaction".to_string()))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StorageError::Transaction("no open transaction".to_string()))?;
        let name = self.current()?.to_string();
        let mut state = self.server.lock()?;
        state.databases.insert(name, snapshot);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            let _ = self.rollback();
        }
        if let Ok(mut state) = self.server.state.lock() {
            state.open_connections -= 1;
        }
    }
}

/// In-memory dialect targeting one database on a [`MemoryServer`]
#[derive(Debug, Clone)]
pub struct MemoryDialect {
    server: MemoryServer,
    database: String,
}

impl MemoryDialect {
    pub fn new(server: MemoryServer, database: impl Into<String>) -> Self {
        Self {
            server,
            database: database.into(),
        }
    }

    pub fn server(&self) -> &MemoryServer {
        &self.server
    }
}

impl Dialect for MemoryDialect {
    type Conn = MemoryConnection;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    fn open(&self) -> StorageResult<MemoryConnection> {
        self.server.connect(Some(self.database.as_str()))
    }

    fn open_without_database(&self) -> StorageResult<MemoryConnection> {
        self.server.connect(None)
    }

    fn table_exists(&self, conn: &mut MemoryConnection, table: &str) -> StorageResult<bool> {
        conn.has_table(table)
    }

    fn generate_sql_script(
        &self,
        conn: &mut MemoryConnection,
        include_data: bool,
    ) -> StorageResult<String> {
        conn.script(include_data)
    }
}
