//! Reconciled view of on-disk migrations and the applied-migration ledger

use crate::migration::{Migration, Version};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Status of a single migration against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// No ledger entry exists for the version
    Pending,
    /// A ledger entry exists and its hash matches
    Applied,
    /// A ledger entry exists but was recorded with a different hash
    Drifted { recorded: String },
}

impl MigrationStatus {
    /// Whether the ledger holds an entry for the migration
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Drifted { .. } => "drifted",
        }
    }
}

/// Every known migration in ascending version order, paired with the
/// ledger's recorded hashes
///
/// A set is a snapshot: callers rebuild it from the migration source and the
/// ledger after every state change instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
    ledger: HashMap<Version, String>,
}

/// One row of the reconciled view
#[derive(Debug, Clone, Serialize)]
pub struct MigrationEntry<'a> {
    pub version: &'a Version,
    pub name: &'a str,
    pub hash: &'a str,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

impl MigrationSet {
    /// Merge migrations with the ledger
    ///
    /// Output order follows the input order; sources yield ascending
    /// versions, which is the order migrations are applied in.
    pub fn reconcile(migrations: Vec<Migration>, ledger: HashMap<Version, String>) -> Self {
        Self { migrations, ledger }
    }

    /// A set with no ledger entries (every migration pending)
    pub fn unapplied(migrations: Vec<Migration>) -> Self {
        Self::reconcile(migrations, HashMap::new())
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn ledger(&self) -> &HashMap<Version, String> {
        &self.ledger
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn get(&self, version: &Version) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version() == version)
    }

    /// Status of the migration with the given version, if it is known
    pub fn status(&self, version: &Version) -> Option<MigrationStatus> {
        self.get(version).map(|m| self.status_of(m))
    }

    fn status_of(&self, migration: &Migration) -> MigrationStatus {
        match self.ledger.get(migration.version()) {
            None => MigrationStatus::Pending,
            Some(recorded) if recorded == migration.hash() => MigrationStatus::Applied,
            Some(recorded) => MigrationStatus::Drifted {
                recorded: recorded.clone(),
            },
        }
    }

    /// Every migration with its status, in ascending version order
    pub fn entries(&self) -> impl Iterator<Item = MigrationEntry<'_>> {
        self.migrations.iter().map(move |m| MigrationEntry {
            version: m.version(),
            name: m.name(),
            hash: m.hash(),
            status: self.status_of(m),
        })
    }

    pub fn pending(&self) -> Vec<&Migration> {
        self.migrations
            .iter()
            .filter(|m| !self.ledger.contains_key(m.version()))
            .collect()
    }

    /// Migrations with a ledger entry, drifted ones included
    pub fn applied(&self) -> Vec<&Migration> {
        self.migrations
            .iter()
            .filter(|m| self.ledger.contains_key(m.version()))
            .collect()
    }

    pub fn drifted(&self) -> Vec<&Migration> {
        self.migrations
            .iter()
            .filter(|m| matches!(self.status_of(m), MigrationStatus::Drifted { .. }))
            .collect()
    }

    pub fn has_drift(&self) -> bool {
        !self.drifted().is_empty()
    }

    /// Ledger versions with no corresponding migration, sorted ascending
    pub fn orphaned(&self) -> Vec<&Version> {
        let mut orphans: Vec<&Version> = self
            .ledger
            .keys()
            .filter(|v| self.get(v).is_none())
            .collect();
        orphans.sort();
        orphans
    }

    /// The lowest-versioned pending migration
    pub fn next_pending(&self) -> Option<&Migration> {
        self.pending().into_iter().next()
    }

    /// The highest-versioned migration with a ledger entry
    pub fn last_applied(&self) -> Option<&Migration> {
        self.applied().into_iter().last()
    }
}

impl Serialize for MigrationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            migrations: Vec<MigrationEntry<'a>>,
            orphaned: Vec<&'a Version>,
        }

        View {
            migrations: self.entries().collect(),
            orphaned: self.orphaned(),
        }
        .serialize(serializer)
    }
}
