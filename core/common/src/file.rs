//! File identity and version references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{Error, Result, SyncPath};

/// A concrete file as it exists in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Location of the file.
    pub path: SyncPath,
    /// Last modification time.
    pub last_write_time: DateTime<Utc>,
    /// Size in bytes.
    pub length: u64,
}

impl File {
    /// Create a new file description.
    pub fn new(path: SyncPath, last_write_time: DateTime<Utc>, length: u64) -> Self {
        Self {
            path,
            last_write_time,
            length,
        }
    }

    /// A reference with every property specified.
    pub fn to_reference(&self) -> FileReference {
        FileReference {
            path: self.path.clone(),
            last_write_time: Some(self.last_write_time),
            length: Some(self.length),
        }
    }
}

/// Reference to a specific version of a file.
///
/// The path identifies the file; the optional properties narrow the
/// reference down to one version. Unspecified properties match anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawFileReference")]
pub struct FileReference {
    path: SyncPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_write_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
}

impl FileReference {
    /// Create a reference.
    ///
    /// # Errors
    /// - Returns error if `path` is the root, which cannot name a file
    pub fn new(
        path: SyncPath,
        last_write_time: Option<DateTime<Utc>>,
        length: Option<u64>,
    ) -> Result<Self> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "A file reference cannot point at the root".to_string(),
            ));
        }
        Ok(Self {
            path,
            last_write_time,
            length,
        })
    }

    /// A reference that matches any version of the file at `path`.
    pub fn for_path(path: SyncPath) -> Result<Self> {
        Self::new(path, None, None)
    }

    pub fn path(&self) -> &SyncPath {
        &self.path
    }

    pub fn last_write_time(&self) -> Option<DateTime<Utc>> {
        self.last_write_time
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Check whether `file` is the version this reference points to.
    pub fn matches(&self, file: &File) -> bool {
        self.path == file.path
            && self.last_write_time.map_or(true, |t| t == file.last_write_time)
            && self.length.map_or(true, |l| l == file.length)
    }

    /// Whether both optional properties are specified.
    pub fn is_complete(&self) -> bool {
        self.last_write_time.is_some() && self.length.is_some()
    }

    /// Turn a fully specified reference back into a file.
    pub fn to_file(&self) -> Option<File> {
        Some(File::new(
            self.path.clone(),
            self.last_write_time?,
            self.length?,
        ))
    }
}

#[derive(Deserialize)]
struct RawFileReference {
    path: SyncPath,
    #[serde(default)]
    last_write_time: Option<DateTime<Utc>>,
    #[serde(default)]
    length: Option<u64>,
}

impl TryFrom<RawFileReference> for FileReference {
    type Error = Error;

    fn try_from(raw: RawFileReference) -> Result<Self> {
        FileReference::new(raw.path, raw.last_write_time, raw.length)
    }
}

impl PartialEq for FileReference {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.last_write_time == other.last_write_time
            && self.length == other.length
    }
}

impl Eq for FileReference {}

impl Hash for FileReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.last_write_time.hash(state);
        self.length.hash(state);
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        match (self.last_write_time, self.length) {
            (Some(t), Some(l)) => write!(f, " ({}, {} bytes)", t.to_rfc3339(), l),
            (Some(t), None) => write!(f, " ({})", t.to_rfc3339()),
            (None, Some(l)) => write!(f, " ({} bytes)", l),
            (None, None) => Ok(()),
        }
    }
}

impl From<&File> for FileReference {
    fn from(file: &File) -> Self {
        file.to_reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn file(path: &str, secs: i64, length: u64) -> File {
        File::new(
            SyncPath::parse(path).unwrap(),
            Utc.timestamp_opt(secs, 0).unwrap(),
            length,
        )
    }

    #[test]
    fn test_reference_of_root_fails() {
        assert!(FileReference::for_path(SyncPath::root()).is_err());
        assert!(serde_json::from_str::<FileReference>(r#"{"path":"/"}"#).is_err());
    }

    #[test]
    fn test_reference_serde() {
        let reference = file("/a/file.txt", 100, 10).to_reference();
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(serde_json::from_str::<FileReference>(&json).unwrap(), reference);

        let any: FileReference = serde_json::from_str(r#"{"path":"/a/file.txt"}"#).unwrap();
        assert!(!any.is_complete());
    }

    #[test]
    fn test_matches_full_reference() {
        let f = file("/a/file.txt", 100, 10);
        let reference = f.to_reference();
        assert!(reference.matches(&f));
        assert!(!reference.matches(&file("/a/file.txt", 101, 10)));
        assert!(!reference.matches(&file("/a/file.txt", 100, 11)));
        assert!(!reference.matches(&file("/a/other.txt", 100, 10)));
    }

    #[test]
    fn test_matches_ignores_case_of_path() {
        let reference = file("/A/File.TXT", 100, 10).to_reference();
        assert!(reference.matches(&file("/a/file.txt", 100, 10)));
    }

    #[test]
    fn test_unspecified_fields_never_mismatch() {
        let path = SyncPath::parse("/a.txt").unwrap();
        let any = FileReference::for_path(path.clone()).unwrap();
        assert!(any.matches(&file("/a.txt", 1, 2)));

        let by_length = FileReference::new(path, None, Some(2)).unwrap();
        assert!(by_length.matches(&file("/a.txt", 999, 2)));
        assert!(!by_length.matches(&file("/a.txt", 999, 3)));
    }

    #[test]
    fn test_equality_includes_version() {
        let a = file("/x", 1, 1).to_reference();
        let b = file("/X", 1, 1).to_reference();
        let c = file("/x", 2, 1).to_reference();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_reference_serialization() {
        let reference = file("/dir/f.bin", 42, 7).to_reference();
        let json = serde_json::to_string(&reference).unwrap();
        let restored: FileReference = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, reference);

        let partial: FileReference = serde_json::from_str(r#"{"path":"/dir/f.bin"}"#).unwrap();
        assert_eq!(partial.length(), None);
        assert!(!partial.is_complete());
    }

    proptest! {
        #[test]
        fn prop_matches_iff_specified_fields_equal(
            secs in 0i64..1_000,
            len in 0u64..1_000,
            other_secs in 0i64..1_000,
            other_len in 0u64..1_000,
            specify_time in any::<bool>(),
            specify_len in any::<bool>(),
        ) {
            let target = file("/p.txt", other_secs, other_len);
            let reference = FileReference::new(
                SyncPath::parse("/P.TXT").unwrap(),
                specify_time.then(|| Utc.timestamp_opt(secs, 0).unwrap()),
                specify_len.then_some(len),
            ).unwrap();

            let expected = (!specify_time || secs == other_secs) && (!specify_len || len == other_len);
            prop_assert_eq!(reference.matches(&target), expected);
        }
    }
}
