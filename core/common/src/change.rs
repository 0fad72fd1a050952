//! Observed transitions of a single file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, FileReference, Result, SyncPath};

/// Kind of transition a file went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Added => "Added",
            ChangeType::Modified => "Modified",
            ChangeType::Deleted => "Deleted",
        };
        f.write_str(name)
    }
}

/// One transition of a file from one version to the next.
///
/// `None` on either side stands for "file absent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChange")]
pub struct Change {
    change_type: ChangeType,
    from_version: Option<FileReference>,
    to_version: Option<FileReference>,
}

impl Change {
    /// Create a change, enforcing which versions each type carries.
    ///
    /// # Errors
    /// - `Added` with a `from_version` or without a `to_version`
    /// - `Deleted` with a `to_version` or without a `from_version`
    /// - `Modified` without both versions
    /// - versions that refer to different paths
    pub fn new(
        change_type: ChangeType,
        from_version: Option<FileReference>,
        to_version: Option<FileReference>,
    ) -> Result<Self> {
        let valid = match change_type {
            ChangeType::Added => from_version.is_none() && to_version.is_some(),
            ChangeType::Deleted => from_version.is_some() && to_version.is_none(),
            ChangeType::Modified => from_version.is_some() && to_version.is_some(),
        };
        if !valid {
            return Err(Error::InvalidInput(format!(
                "{} change has unexpected versions (from: {}, to: {})",
                change_type,
                if from_version.is_some() { "set" } else { "none" },
                if to_version.is_some() { "set" } else { "none" },
            )));
        }

        if let (Some(from), Some(to)) = (&from_version, &to_version) {
            if from.path() != to.path() {
                return Err(Error::InvalidInput(format!(
                    "Change versions refer to different paths: {} and {}",
                    from.path(),
                    to.path()
                )));
            }
        }

        Ok(Self {
            change_type,
            from_version,
            to_version,
        })
    }

    pub fn added(to_version: FileReference) -> Self {
        Self {
            change_type: ChangeType::Added,
            from_version: None,
            to_version: Some(to_version),
        }
    }

    pub fn deleted(from_version: FileReference) -> Self {
        Self {
            change_type: ChangeType::Deleted,
            from_version: Some(from_version),
            to_version: None,
        }
    }

    pub fn modified(from_version: FileReference, to_version: FileReference) -> Result<Self> {
        Self::new(ChangeType::Modified, Some(from_version), Some(to_version))
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn from_version(&self) -> Option<&FileReference> {
        self.from_version.as_ref()
    }

    pub fn to_version(&self) -> Option<&FileReference> {
        self.to_version.as_ref()
    }

    /// The path of the changed file.
    pub fn path(&self) -> &SyncPath {
        // One side is always present.
        match (&self.from_version, &self.to_version) {
            (Some(from), _) => from.path(),
            (None, Some(to)) => to.path(),
            (None, None) => unreachable!("change without versions"),
        }
    }
}

#[derive(Deserialize)]
struct RawChange {
    change_type: ChangeType,
    from_version: Option<FileReference>,
    to_version: Option<FileReference>,
}

impl TryFrom<RawChange> for Change {
    type Error = Error;

    fn try_from(raw: RawChange) -> Result<Self> {
        Change::new(raw.change_type, raw.from_version, raw.to_version)
    }
}

/// The ordered changes of exactly one path between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeList {
    path: SyncPath,
    changes: Vec<Change>,
}

impl ChangeList {
    /// Create a change list.
    ///
    /// Changes are kept in the given order and must form a version chain:
    /// each change starts from the version the previous one ended with.
    ///
    /// # Errors
    /// - `changes` is empty
    /// - a change refers to another path
    /// - the version chain is broken
    pub fn new(changes: Vec<Change>) -> Result<Self> {
        let first = changes
            .first()
            .ok_or_else(|| Error::Format("A change list cannot be empty".to_string()))?;
        let path = first.path().clone();

        for change in &changes {
            if change.path() != &path {
                return Err(Error::Format(format!(
                    "Change for {} does not belong to change list for {}",
                    change.path(),
                    path
                )));
            }
        }

        for pair in changes.windows(2) {
            if pair[0].to_version() != pair[1].from_version() {
                return Err(Error::Format(format!(
                    "Changes for {} do not form a version chain",
                    path
                )));
            }
        }

        Ok(Self { path, changes })
    }

    pub fn path(&self) -> &SyncPath {
        &self.path
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Version the file had before the first change.
    pub fn initial_version(&self) -> Option<&FileReference> {
        self.changes.first().and_then(Change::from_version)
    }

    /// Version the file has after the last change.
    pub fn final_version(&self) -> Option<&FileReference> {
        self.changes.last().and_then(Change::to_version)
    }
}
