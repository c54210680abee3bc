//! CLI configuration (`shale.toml`)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shale_storage::{RepositoryConfig, DEFAULT_MIGRATIONS_DIR, DEFAULT_TABLE_NAME};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "shale.toml";

/// Configuration for the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database dialect (only `sqlite` is built in)
    pub dialect: String,

    /// Connection descriptor; a file path for sqlite
    pub database: String,

    /// Name of the tracking table
    pub table_name: String,

    /// Directory of migration scripts
    pub migrations_dir: PathBuf,

    /// Allow `up` / `down` runs while drift is present
    pub allow_drift: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: "sqlite".to_string(),
            database: "shale.db".to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            allow_drift: false,
        }
    }
}

impl Config {
    /// Load a config file, falling back to defaults when it does not exist
    ///
    /// Relative paths in the file resolve against the file's directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("parse config file: {}", path.display()))?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Write the config file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("serialize config")?;
        fs::write(path, content).with_context(|| format!("write config file: {}", path.display()))?;
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.migrations_dir.is_relative() {
            self.migrations_dir = base.join(&self.migrations_dir);
        }
        let database = Path::new(&self.database);
        if self.dialect == "sqlite" && database.is_relative() {
            self.database = base.join(database).to_string_lossy().into_owned();
        }
    }

    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig::new(self.migrations_dir.clone())
            .with_table_name(self.table_name.clone())
            .with_allow_drift(self.allow_drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(&temp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "database = \"data/app.db\"\nallow_drift = true\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert!(config.allow_drift);
        assert_eq!(
            PathBuf::from(&config.database),
            temp.path().join("data").join("app.db")
        );
        assert_eq!(config.migrations_dir, temp.path().join(DEFAULT_MIGRATIONS_DIR));
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        let config = Config {
            database: "/var/db/app.db".to_string(),
            table_name: "schema_history".to_string(),
            migrations_dir: temp.path().join("sql"),
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "database = [").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
