//! Folder tree representation.
//!
//! A `Directory` is the content of one snapshot: nested directories and
//! files with the metadata used to tell versions apart. Child lookup is
//! case-insensitive, the stored names keep their original spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use synctool_common::{Error, File, Result, SyncPath};

/// Metadata of a file stored in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name as written.
    pub name: String,
    /// Last modification time.
    pub last_write_time: DateTime<Utc>,
    /// Size in bytes.
    pub length: u64,
}

/// A directory and everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// Directory name as written (empty for the root).
    name: String,
    /// Sub-directories keyed by lower-cased name.
    #[serde(default)]
    directories: BTreeMap<String, Directory>,
    /// Files keyed by lower-cased name.
    #[serde(default)]
    files: BTreeMap<String, FileEntry>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl Directory {
    /// Create a new empty root directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Directory name (empty for the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Navigate to a directory by path.
    pub fn directory(&self, path: &SyncPath) -> Option<&Directory> {
        let mut current = self;
        for component in path.components() {
            current = current.directories.get(&key(component))?;
        }
        Some(current)
    }

    /// Get the file at `path`, if any.
    pub fn file(&self, path: &SyncPath) -> Option<File> {
        let name = path.name()?;
        let parent = self.directory(&path.parent()?)?;
        let entry = parent.files.get(&key(name))?;

        let parent_path = path.parent()?;
        let file_path = parent_path.join(&entry.name).ok()?;
        Some(File::new(file_path, entry.last_write_time, entry.length))
    }

    /// Check if a file exists at `path`.
    pub fn contains_file(&self, path: &SyncPath) -> bool {
        self.file(path).is_some()
    }

    /// Create a directory, including missing parents.
    ///
    /// # Errors
    /// - A file occupies one of the path components
    pub fn create_directory(&mut self, path: &SyncPath) -> Result<&mut Directory> {
        let mut current = self;
        for component in path.components() {
            let k = key(component);
            if current.files.contains_key(&k) {
                return Err(Error::InvalidInput(format!(
                    "Cannot create directory {}: '{}' is a file",
                    path, component
                )));
            }
            current = current
                .directories
                .entry(k)
                .or_insert_with(|| Directory::named(component));
        }
        Ok(current)
    }

    /// Add a file, creating missing parent directories.
    ///
    /// # Errors
    /// - A file already exists at the path
    /// - A directory exists at the path, or a file blocks a parent
    pub fn add_file(&mut self, file: &File) -> Result<()> {
        let name = file
            .path
            .name()
            .ok_or_else(|| Error::InvalidInput("Cannot create file at root".to_string()))?;
        let parent_path = file
            .path
            .parent()
            .ok_or_else(|| Error::InvalidInput("Cannot create file at root".to_string()))?;

        let parent = self.create_directory(&parent_path)?;
        let k = key(name);

        if parent.files.contains_key(&k) {
            return Err(Error::AlreadyExists(format!("File already exists: {}", file.path)));
        }
        if parent.directories.contains_key(&k) {
            return Err(Error::InvalidInput(format!(
                "Cannot create file {}: a directory has the same name",
                file.path
            )));
        }

        parent.files.insert(
            k,
            FileEntry {
                name: name.to_string(),
                last_write_time: file.last_write_time,
                length: file.length,
            },
        );
        Ok(())
    }

    /// Remove the file at `path` and return it.
    ///
    /// # Errors
    /// - No file exists at the path
    pub fn remove_file(&mut self, path: &SyncPath) -> Result<File> {
        let existing = self
            .file(path)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))?;

        let mut current = self;
        for component in existing.path.components().iter().take(existing.path.components().len() - 1) {
            current = current
                .directories
                .get_mut(&key(component))
                .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))?;
        }
        if let Some(name) = existing.path.name() {
            current.files.remove(&key(name));
        }

        Ok(existing)
    }

    /// All files below this directory, in path order.
    pub fn files(&self) -> Vec<File> {
        let mut result = Vec::new();
        self.collect_files(&SyncPath::root(), &mut result);
        result
    }

    fn collect_files(&self, path: &SyncPath, out: &mut Vec<File>) {
        for entry in self.files.values() {
            if let Ok(file_path) = path.join(&entry.name) {
                out.push(File::new(file_path, entry.last_write_time, entry.length));
            }
        }
        for child in self.directories.values() {
            if let Ok(child_path) = path.join(&child.name) {
                child.collect_files(&child_path, out);
            }
        }
    }

    /// Count the total number of files in the tree.
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .directories
                .values()
                .map(Directory::file_count)
                .sum::<usize>()
    }

    /// Get the total size of all files in the tree.
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.length).sum::<u64>()
            + self
                .directories
                .values()
                .map(Directory::total_size)
                .sum::<u64>()
    }

    /// Serialize tree to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize tree from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}
