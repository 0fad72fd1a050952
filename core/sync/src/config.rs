//! Group configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use synctool_common::{Error, Result};
use synctool_storage::PathFilter;

/// Group format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersion {
    pub major: u32,
    pub minor: u32,
}

impl GroupVersion {
    /// Current group format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for GroupVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Configuration of a synchronization group.
///
/// Stored as JSON at the group root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group format version.
    #[serde(default)]
    pub version: GroupVersion,
    /// Group name; the target of conflict actions.
    pub name: String,
    /// Names of the participating histories.
    pub histories: Vec<String>,
    /// Paths taking part in synchronization.
    #[serde(default)]
    pub filter: PathFilter,
    /// Group creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl GroupConfig {
    /// Create a new group configuration.
    ///
    /// # Preconditions
    /// - `name` must not be empty
    /// - history names must be unique (ignoring case) and must not equal
    ///   the group name
    ///
    /// # Errors
    /// - `InvalidInput` on a violated precondition
    pub fn new(name: impl Into<String>, histories: Vec<String>, filter: PathFilter) -> Result<Self> {
        let config = Self {
            version: GroupVersion::CURRENT,
            name: name.into(),
            histories,
            filter,
            created_at: Utc::now(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants of a loaded or constructed configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.version.is_compatible() {
            return Err(Error::InvalidInput(format!(
                "Unsupported group version {}.{}",
                self.version.major, self.version.minor
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Group name cannot be empty".to_string()));
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.histories.len());
        for history in &self.histories {
            let lower = history.to_lowercase();
            if history.trim().is_empty() {
                return Err(Error::InvalidInput("History name cannot be empty".to_string()));
            }
            if lower == self.name.to_lowercase() {
                return Err(Error::InvalidInput(format!(
                    "History '{}' has the same name as the group",
                    history
                )));
            }
            if seen.contains(&lower) {
                return Err(Error::InvalidInput(format!("Duplicate history '{}'", history)));
            }
            seen.push(lower);
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration file name in the group root.
pub const CONFIG_FILENAME: &str = "synctool.json";

/// Document store directory name in the group root.
pub const STORE_DIRNAME: &str = "store";
