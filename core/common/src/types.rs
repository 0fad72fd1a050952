//! Common types used throughout SyncTool.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{Error, Result};

/// A rooted path within a synchronized folder.
///
/// Paths are `/`-separated and always start at the root. Comparison, hashing
/// and ordering ignore case; the original spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPath {
    components: Vec<String>,
}

impl SyncPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty, contains a separator or
    ///   is a relative reference (`.` / `..`)
    pub fn from_components(components: Vec<String>) -> Result<Self> {
        for comp in &components {
            Self::validate_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a rooted path string such as `/docs/report.txt`.
    ///
    /// A single trailing separator is tolerated.
    pub fn parse(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::Format(format!("Path '{}' is not rooted", path)));
        }
        if path == "/" {
            return Ok(Self::root());
        }

        let trimmed = path[1..].strip_suffix('/').unwrap_or(&path[1..]);
        let components: Vec<String> = trimmed.split('/').map(String::from).collect();
        Self::from_components(components)
            .map_err(|e| Error::Format(format!("Invalid path '{}': {}", path, e)))
    }

    fn validate_component(comp: &str) -> Result<()> {
        if comp.is_empty() {
            return Err(Error::InvalidInput(
                "Path component cannot be empty".to_string(),
            ));
        }
        if comp.contains('/') || comp.contains('\\') {
            return Err(Error::InvalidInput(
                "Path component cannot contain separators".to_string(),
            ));
        }
        if comp == "." || comp == ".." {
            return Err(Error::InvalidInput(
                "Path component cannot be a relative reference".to_string(),
            ));
        }
        Ok(())
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> Result<Self> {
        Self::validate_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &SyncPath) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix
                .components
                .iter()
                .zip(&self.components)
                .all(|(a, b)| fold(a) == fold(b))
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }

    /// The case-folded string form, suitable as a lookup key.
    pub fn normalized(&self) -> String {
        fold(&self.to_string_path())
    }
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

impl PartialEq for SyncPath {
    fn eq(&self, other: &Self) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| fold(a) == fold(b))
    }
}

impl Eq for SyncPath {}

impl Hash for SyncPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.len().hash(state);
        for comp in &self.components {
            fold(comp).hash(state);
        }
    }
}

impl Ord for SyncPath {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.components.iter().map(|c| fold(c));
        let right = other.components.iter().map(|c| fold(c));
        left.cmp(right)
    }
}

impl PartialOrd for SyncPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

impl TryFrom<String> for SyncPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SyncPath> for String {
    fn from(path: SyncPath) -> Self {
        path.to_string_path()
    }
}

/// Opaque identifier of a snapshot within a history.
///
/// Compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Create a snapshot id from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "SnapshotId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random snapshot id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for SnapshotId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for SnapshotId {}

impl Hash for SnapshotId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SnapshotId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SnapshotId> for String {
    fn from(id: SnapshotId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sync_path_root() {
        let path = SyncPath::parse("/").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string_path(), "/");
    }

    #[test]
    fn test_sync_path_parse() {
        let path = SyncPath::parse("/foo/bar/baz").unwrap();
        assert_eq!(path.components(), &["foo", "bar", "baz"]);
        assert_eq!(path.to_string_path(), "/foo/bar/baz");
    }

    #[test]
    fn test_sync_path_must_be_rooted() {
        assert!(matches!(SyncPath::parse("foo/bar"), Err(Error::Format(_))));
        assert!(SyncPath::parse("/foo//bar").is_err());
        assert!(SyncPath::parse("/foo/../bar").is_err());
    }

    #[test]
    fn test_sync_path_case_insensitive() {
        let a = SyncPath::parse("/Docs/Report.TXT").unwrap();
        let b = SyncPath::parse("/docs/report.txt").unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        // Display keeps the original spelling
        assert_eq!(a.to_string(), "/Docs/Report.TXT");
        assert_eq!(a.normalized(), "/docs/report.txt");
    }

    #[test]
    fn test_sync_path_join_and_parent() {
        let path = SyncPath::root().join("foo").unwrap().join("bar").unwrap();
        assert_eq!(path.to_string_path(), "/foo/bar");
        assert_eq!(path.parent().unwrap().to_string_path(), "/foo");
        assert_eq!(path.name(), Some("bar"));
        assert!(SyncPath::root().join("a/b").is_err());
    }

    #[test]
    fn test_sync_path_starts_with() {
        let path = SyncPath::parse("/Foo/bar/baz.txt").unwrap();
        assert!(path.starts_with(&SyncPath::parse("/foo").unwrap()));
        assert!(path.starts_with(&SyncPath::root()));
        assert!(!path.starts_with(&SyncPath::parse("/foo/ba").unwrap()));
    }

    #[test]
    fn test_sync_path_serde() {
        let path = SyncPath::parse("/a/B.txt").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/a/B.txt\"");
        let restored: SyncPath = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, path);
        assert!(serde_json::from_str::<SyncPath>("\"relative\"").is_err());
    }

    #[test]
    fn test_snapshot_id_case_insensitive() {
        let a = SnapshotId::new("ABC123").unwrap();
        let b = SnapshotId::new("abc123").unwrap();
        assert_eq!(a, b);
        assert!(SnapshotId::new("").is_err());
        assert_ne!(SnapshotId::generate(), SnapshotId::generate());
    }
}
