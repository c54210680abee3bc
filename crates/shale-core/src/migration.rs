//! Migration records and content hashing

use crate::batch::split_batches;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a migration
///
/// Versions sort lexically, so timestamp-style versions such as
/// `20240101120000` order chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Create a version, rejecting empty or non-alphanumeric input
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if Self::validate(&s) {
            Ok(Self(s))
        } else {
            Err(Error::InvalidVersion(s))
        }
    }

    /// Validate a version string (ASCII alphanumerics only)
    pub fn validate(s: &str) -> bool {
        !s.is_empty() && s.len() <= 255 && s.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A versioned pair of forward and reverse scripts
///
/// The hash is computed once at construction and is what gets recorded in
/// the ledger when the migration is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    version: Version,
    name: String,
    up: String,
    down: String,
    hash: String,
}

impl Migration {
    pub fn new(
        version: Version,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        let up = up.into();
        let down = down.into();
        let hash = compute_hash(&up, &down);
        Self {
            version,
            name: name.into(),
            up,
            down,
            hash,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn up_script(&self) -> &str {
        &self.up
    }

    pub fn down_script(&self) -> &str {
        &self.down
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Statement batches of the up script, in execution order
    pub fn up_batches(&self) -> Vec<&str> {
        split_batches(&self.up)
    }

    /// Statement batches of the down script, in execution order
    pub fn down_batches(&self) -> Vec<&str> {
        split_batches(&self.down)
    }
}

/// Lowercase hex SHA-256 over the up script, a NUL byte, and the down script
pub fn compute_hash(up: &str, down: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up.as_bytes());
    hasher.update([0u8]);
    hasher.update(down.as_bytes());
    format!("{:x}", hasher.finalize())
}
