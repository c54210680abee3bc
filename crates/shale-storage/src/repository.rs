//! The migration repository: database lifecycle, reconciled state, and the
//! transactional apply/revert engine
//!
//! Every operation opens its own connection and releases it before
//! returning. State is never cached; each call that reports state rebuilds
//! it from the migration source and the ledger.

use crate::error::{StorageError, StorageResult};
use crate::ledger;
use crate::traits::{DbConnection, Dialect, IsolationLevel};
use crate::transaction::Transaction;
use shale_core::{DirectorySource, Migration, MigrationSet, MigrationSource, Version};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default name of the tracking table
pub const DEFAULT_TABLE_NAME: &str = "shale_migrations";

/// Default directory holding migration scripts
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Repository configuration
///
/// The connection descriptor is owned by the [`Dialect`] value.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Name of the tracking table
    pub table_name: String,

    /// Directory of `.up.sql` / `.down.sql` scripts
    pub migrations_dir: PathBuf,

    /// Let `migrate_up` / `migrate_down` run while drift is present
    pub allow_drift: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            allow_drift: false,
        }
    }
}

impl RepositoryConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_allow_drift(mut self, allow_drift: bool) -> Self {
        self.allow_drift = allow_drift;
        self
    }

    /// Validate a table name (ASCII alphanumerics and underscores, not starting with a digit)
    pub fn validate_table_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 128
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

/// Orchestrates the ledger, the migration source, and a dialect
pub struct Repository<D: Dialect> {
    dialect: D,
    table_name: String,
    allow_drift: bool,
    source: Box<dyn MigrationSource>,
}

impl<D: Dialect> Repository<D> {
    /// Create a repository reading migrations from `config.migrations_dir`
    pub fn new(dialect: D, config: RepositoryConfig) -> StorageResult<Self> {
        let source = DirectorySource::new(config.migrations_dir.clone());
        Self::with_source(dialect, config, source)
    }

    /// Create a repository over an arbitrary migration source
    ///
    /// `config.migrations_dir` is ignored.
    pub fn with_source(
        dialect: D,
        config: RepositoryConfig,
        source: impl MigrationSource + 'static,
    ) -> StorageResult<Self> {
        if !RepositoryConfig::validate_table_name(&config.table_name) {
            return Err(StorageError::SchemaConflict(format!(
                "invalid tracking table name: {:?}",
                config.table_name
            )));
        }
        Ok(Self {
            dialect,
            table_name: config.table_name,
            allow_drift: config.allow_drift,
            source: Box::new(source),
        })
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Probes
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the target database exists
    ///
    /// Any failure, including connectivity problems, reads as `false`.
    pub fn database_exists(&self) -> bool {
        self.probe_database().unwrap_or_else(|e| {
            tracing::debug!("Database {} not available: {}", self.dialect.database_name(), e);
            false
        })
    }

    /// Whether the target database accepts connections
    pub fn check_connection(&self) -> bool {
        match self.dialect.open() {
            Ok(conn) => {
                drop(conn);
                true
            }
            Err(e) => {
                tracing::debug!("Connection check failed: {}", e);
                false
            }
        }
    }

    pub fn migration_table_exists(&self) -> StorageResult<bool> {
        let mut conn = self.dialect.open()?;
        self.dialect.table_exists(&mut conn, &self.table_name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_database(&self) -> StorageResult<()> {
        let mut conn = self.dialect.open_without_database()?;
        self.dialect.create_database(&mut conn)?;
        tracing::info!(
            "Created {} database {}",
            self.dialect.name(),
            self.dialect.database_name()
        );
        Ok(())
    }

    pub fn drop_database(&self) -> StorageResult<()> {
        let mut conn = self.dialect.open_without_database()?;
        self.dialect.drop_database(&mut conn)?;
        tracing::info!(
            "Dropped {} database {}",
            self.dialect.name(),
            self.dialect.database_name()
        );
        Ok(())
    }

    /// Create the tracking table and return the resulting state
    pub fn init(&self) -> StorageResult<MigrationSet> {
        {
            let mut conn = self.dialect.open()?;
            ledger::initialize(&self.dialect, &mut conn, &self.table_name)?;
        }
        self.get_state()
    }

    /// Drop only the tracking table
    pub fn drop_migration_table(&self) -> StorageResult<()> {
        let mut conn = self.dialect.open()?;
        self.require_table(&mut conn)?;
        ledger::drop_table(&self.dialect, &mut conn, &self.table_name)
    }

    pub fn generate_sql_script(&self, include_data: bool) -> StorageResult<String> {
        let mut conn = self.dialect.open()?;
        self.dialect.generate_sql_script(&mut conn, include_data)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    /// Reconcile the migration source with the ledger
    ///
    /// A missing database or tracking table reads as an empty ledger, so
    /// every migration is pending. An unreachable server is an error.
    pub fn get_state(&self) -> StorageResult<MigrationSet> {
        let migrations = self.source.load()?;

        let ledger = if self.probe_database()? {
            let mut conn = self.dialect.open()?;
            if self.dialect.table_exists(&mut conn, &self.table_name)? {
                ledger::read_all(&self.dialect, &mut conn, &self.table_name)?
            } else {
                HashMap::new()
            }
        } else {
            HashMap::new()
        };

        let state = MigrationSet::reconcile(migrations, ledger);
        for migration in state.drifted() {
            tracing::warn!(
                "Migration {} changed since it was applied",
                migration.version()
            );
        }
        Ok(state)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a migration's up script and record it, atomically
    pub fn execute_up(&self, migration: &Migration) -> StorageResult<MigrationSet> {
        self.ensure_table()?;
        {
            let mut conn = self.dialect.open()?;
            let mut tx = Transaction::begin(&mut conn, IsolationLevel::ReadUncommitted)?;
            run_batches(tx.connection(), migration.version(), &migration.up_batches())?;
            ledger::record(&self.dialect, tx.connection(), &self.table_name, migration)?;
            tx.commit()?;
        }
        tracing::info!("Applied migration {}", migration.version());
        self.get_state()
    }

    /// Apply a migration's down script and remove its ledger entry, atomically
    ///
    /// A migration without a ledger entry removes nothing and is not an error.
    /// A missing tracking table is a [`StorageError::SchemaConflict`].
    pub fn execute_down(&self, migration: &Migration) -> StorageResult<MigrationSet> {
        {
            let mut conn = self.dialect.open()?;
            self.require_table(&mut conn)?;
            let mut tx = Transaction::begin(&mut conn, IsolationLevel::ReadCommitted)?;
            run_batches(tx.connection(), migration.version(), &migration.down_batches())?;
            let removed =
                ledger::remove(&self.dialect, tx.connection(), &self.table_name, migration.version())?;
            tx.commit()?;
            if removed == 0 {
                tracing::debug!("No ledger entry for {}", migration.version());
            }
        }
        tracing::info!("Reverted migration {}", migration.version());
        self.get_state()
    }

    /// Record a migration as applied without running its script
    pub fn record_migration(&self, migration: &Migration) -> StorageResult<MigrationSet> {
        self.ensure_table()?;
        {
            let mut conn = self.dialect.open()?;
            ledger::record(&self.dialect, &mut conn, &self.table_name, migration)?;
        }
        tracing::info!("Recorded migration {} without executing it", migration.version());
        self.get_state()
    }

    /// Apply pending migrations in ascending order, up to and including `target`
    ///
    /// Each migration runs in its own transaction; the first failure stops
    /// the run and leaves earlier migrations applied.
    pub fn migrate_up(&self, target: Option<&Version>) -> StorageResult<MigrationSet> {
        let mut state = self.get_state()?;
        self.check_drift(&state)?;
        check_target(&state, target)?;

        let pending: Vec<Migration> = state
            .pending()
            .into_iter()
            .filter(|m| target.map_or(true, |t| m.version() <= t))
            .cloned()
            .collect();

        tracing::info!("Applying {} pending migrations", pending.len());
        for migration in &pending {
            state = self.execute_up(migration)?;
        }
        Ok(state)
    }

    /// Revert applied migrations in descending order while their version is
    /// above `target` (everything when `target` is `None`)
    pub fn migrate_down(&self, target: Option<&Version>) -> StorageResult<MigrationSet> {
        let mut state = self.get_state()?;
        self.check_drift(&state)?;
        check_target(&state, target)?;

        for orphan in state.orphaned() {
            tracing::warn!("Ledger entry {} has no migration script and is skipped", orphan);
        }

        let applied: Vec<Migration> = state
            .applied()
            .into_iter()
            .rev()
            .filter(|m| target.map_or(true, |t| m.version() > t))
            .cloned()
            .collect();

        tracing::info!("Reverting {} applied migrations", applied.len());
        for migration in &applied {
            state = self.execute_down(migration)?;
        }
        Ok(state)
    }

    /// Select the target database over a database-less connection
    ///
    /// Only a failed select reads as `Ok(false)`; failing to reach the
    /// server at all is a [`StorageError::Connection`].
    fn probe_database(&self) -> StorageResult<bool> {
        let mut conn = self.dialect.open_without_database().map_err(|e| match e {
            StorageError::Connection(_) => e,
            other => StorageError::Connection(other.to_string()),
        })?;
        match conn.execute(&self.dialect.select_database_sql()) {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!("Cannot select {}: {}", self.dialect.database_name(), e);
                Ok(false)
            }
        }
    }

    fn require_table(&self, conn: &mut D::Conn) -> StorageResult<()> {
        if self.dialect.table_exists(conn, &self.table_name)? {
            return Ok(());
        }
        Err(StorageError::SchemaConflict(format!(
            "tracking table {} does not exist",
            self.table_name
        )))
    }

    fn ensure_table(&self) -> StorageResult<()> {
        let mut conn = self.dialect.open()?;
        if !self.dialect.table_exists(&mut conn, &self.table_name)? {
            ledger::initialize(&self.dialect, &mut conn, &self.table_name)?;
        }
        Ok(())
    }

    fn check_drift(&self, state: &MigrationSet) -> StorageResult<()> {
        if self.allow_drift || !state.has_drift() {
            return Ok(());
        }
        Err(StorageError::DriftDetected(
            state
                .drifted()
                .iter()
                .map(|m| m.version().to_string())
                .collect(),
        ))
    }
}

fn check_target(state: &MigrationSet, target: Option<&Version>) -> StorageResult<()> {
    match target {
        Some(version) if state.get(version).is_none() => {
            Err(StorageError::UnknownVersion(version.to_string()))
        }
        _ => Ok(()),
    }
}

fn run_batches<C: DbConnection>(conn: &mut C, version: &Version, batches: &[&str]) -> StorageResult<()> {
    for (index, batch) in batches.iter().enumerate() {
        tracing::debug!("Migration {} batch {}/{}", version, index + 1, batches.len());
        conn.execute(batch).map_err(|e| StorageError::Execution {
            version: version.to_string(),
            batch: index + 1,
            message: e.to_string(),
        })?;
    }
    Ok(())
}
