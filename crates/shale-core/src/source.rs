//! Migration sources
//!
//! A source produces the full list of known migrations in ascending version
//! order. The directory source reads script pairs named
//! `<version>[_<name>].up.sql` and `<version>[_<name>].down.sql`.

use crate::error::{Error, Result};
use crate::migration::{Migration, Version};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const UP_SUFFIX: &str = ".up.sql";
pub const DOWN_SUFFIX: &str = ".down.sql";

/// Anything that can produce the ordered list of known migrations
pub trait MigrationSource {
    /// Load every migration, ascending by version
    fn load(&self) -> Result<Vec<Migration>>;
}

/// Static migrations, useful for embedding and tests
impl MigrationSource for Vec<Migration> {
    fn load(&self) -> Result<Vec<Migration>> {
        let mut migrations = self.clone();
        migrations.sort_by(|a, b| a.version().cmp(b.version()));
        check_unique(&migrations)?;
        Ok(migrations)
    }
}

/// Loads migrations from a directory of `.up.sql` / `.down.sql` files
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

#[derive(Default)]
struct ScriptPair {
    name: Option<String>,
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collect_pairs(&self) -> Result<BTreeMap<Version, ScriptPair>> {
        let mut pairs: BTreeMap<Version, ScriptPair> = BTreeMap::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let (stem, is_up) = if let Some(stem) = file_name.strip_suffix(UP_SUFFIX) {
                (stem, true)
            } else if let Some(stem) = file_name.strip_suffix(DOWN_SUFFIX) {
                (stem, false)
            } else {
                tracing::trace!("Ignoring non-migration file {}", path.display());
                continue;
            };

            let (version, name) = parse_stem(stem)?;
            let pair = pairs.entry(version.clone()).or_default();
            if pair.name.get_or_insert_with(|| name.to_string()).as_str() != name {
                return Err(Error::DuplicateVersion(version.to_string()));
            }

            let slot = if is_up { &mut pair.up } else { &mut pair.down };
            if slot.is_some() {
                return Err(Error::DuplicateVersion(version.to_string()));
            }
            *slot = Some(path);
        }

        Ok(pairs)
    }
}

impl MigrationSource for DirectorySource {
    fn load(&self) -> Result<Vec<Migration>> {
        if !self.dir.exists() {
            tracing::debug!("Migrations directory {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for (version, pair) in self.collect_pairs()? {
            let up_path = pair.up.ok_or_else(|| {
                Error::Source(format!("migration {} has a down script but no up script", version))
            })?;
            let up = fs::read_to_string(&up_path)?;
            let down = match &pair.down {
                Some(path) => fs::read_to_string(path)?,
                None => String::new(),
            };
            migrations.push(Migration::new(version, pair.name.unwrap_or_default(), up, down));
        }

        tracing::debug!(
            "Loaded {} migrations from {}",
            migrations.len(),
            self.dir.display()
        );
        Ok(migrations)
    }
}

/// Split `<version>[_<name>]` into its parts
fn parse_stem(stem: &str) -> Result<(Version, &str)> {
    let (version, name) = match stem.split_once('_') {
        Some((version, name)) => (version, name),
        None => (stem, ""),
    };
    Ok((Version::new(version)?, name))
}

/// File name of the up script for a migration
pub fn up_file_name(version: &Version, name: &str) -> String {
    if name.is_empty() {
        format!("{}{}", version, UP_SUFFIX)
    } else {
        format!("{}_{}{}", version, name, UP_SUFFIX)
    }
}

/// File name of the down script for a migration
pub fn down_file_name(version: &Version, name: &str) -> String {
    if name.is_empty() {
        format!("{}{}", version, DOWN_SUFFIX)
    } else {
        format!("{}_{}{}", version, name, DOWN_SUFFIX)
    }
}

fn check_unique(migrations: &[Migration]) -> Result<()> {
    for pair in migrations.windows(2) {
        if pair[0].version() == pair[1].version() {
            return Err(Error::DuplicateVersion(pair[0].version().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let source = DirectorySource::new(temp.path().join("nope"));
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_loads_pairs_in_version_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "002_add_email.up.sql", "ALTER TABLE users ADD email TEXT");
        write(temp.path(), "001_create_users.up.sql", "CREATE TABLE users (id INT)");
        write(temp.path(), "001_create_users.down.sql", "DROP TABLE users");
        write(temp.path(), "README.md", "not a migration");

        let migrations = DirectorySource::new(temp.path()).load().unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version().as_str(), "001");
        assert_eq!(migrations[0].name(), "create_users");
        assert_eq!(migrations[0].down_script(), "DROP TABLE users");
        assert_eq!(migrations[1].version().as_str(), "002");
        assert_eq!(migrations[1].down_script(), "");
    }

    #[test]
    fn test_version_without_name() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "20240101.up.sql", "SELECT 1");
        let migrations = DirectorySource::new(temp.path()).load().unwrap();
        assert_eq!(migrations[0].version().as_str(), "20240101");
        assert_eq!(migrations[0].name(), "");
    }

    #[test]
    fn test_down_without_up_is_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "001_x.down.sql", "DROP TABLE x");
        let err = DirectorySource::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn test_duplicate_version_is_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "001_a.up.sql", "SELECT 1");
        write(temp.path(), "001_b.up.sql", "SELECT 2");
        let err = DirectorySource::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion(v) if v == "001"));
    }

    #[test]
    fn test_invalid_version_is_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "v-1.up.sql", "SELECT 1");
        let err = DirectorySource::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(_)));
    }

    #[test]
    fn test_file_names_round_trip_through_loader() {
        let temp = TempDir::new().unwrap();
        let version = Version::new("20240102030405").unwrap();
        write(temp.path(), &up_file_name(&version, "seed"), "INSERT INTO t VALUES (1)");
        write(temp.path(), &down_file_name(&version, "seed"), "DELETE FROM t");

        let migrations = DirectorySource::new(temp.path()).load().unwrap();
        assert_eq!(migrations[0].version(), &version);
        assert_eq!(migrations[0].name(), "seed");
    }

    #[test]
    fn test_static_source_sorts_and_rejects_duplicates() {
        let v = |s: &str| Version::new(s).unwrap();
        let source = vec![
            Migration::new(v("b"), "", "SELECT 2", ""),
            Migration::new(v("a"), "", "SELECT 1", ""),
        ];
        let loaded = source.load().unwrap();
        assert_eq!(loaded[0].version().as_str(), "a");

        let dup = vec![
            Migration::new(v("a"), "", "SELECT 1", ""),
            Migration::new(v("a"), "", "SELECT 2", ""),
        ];
        assert!(dup.load().is_err());
    }
}
