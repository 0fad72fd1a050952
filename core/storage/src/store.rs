//! Document store trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use synctool_common::{Error, Result};

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Create or overwrite the document at `key`.
    Put { key: String, data: Vec<u8> },
    /// Remove the document at `key`; removing a missing key is a no-op.
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// An ordered set of writes that is committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            data,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Check every key in the batch.
    pub fn validate(&self) -> Result<()> {
        self.ops.iter().try_for_each(|op| validate_key(op.key()))
    }
}

/// Key-value document store with hierarchical, `/`-separated keys.
///
/// Keys address documents; every proper prefix of a key acts as a
/// collection whose direct children can be listed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the store name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Read the document at `key`.
    ///
    /// # Returns
    /// `None` if no document is stored under the key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List the names of the direct children of a collection, sorted.
    ///
    /// A missing collection is empty, not an error.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Apply a batch of writes atomically.
    ///
    /// # Postconditions
    /// - Either every write of the batch is visible or none is
    ///
    /// # Errors
    /// - Invalid keys (nothing is written)
    /// - I/O errors
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

/// Check that a key consists of non-empty, non-relative segments.
///
/// Segments starting with `.` are reserved for store internals.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("Store key cannot be empty".to_string()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment.starts_with('.') || segment.contains('\\') {
            return Err(Error::InvalidInput(format!("Invalid store key: {}", key)));
        }
    }
    Ok(())
}

/// Join key segments with the store separator.
pub fn join_key(segments: &[&str]) -> String {
    segments.join("/")
}
