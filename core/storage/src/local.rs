//! Local filesystem document store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use synctool_common::{Error, Result};

use crate::store::{validate_key, DocumentStore, WriteBatch, WriteOp};

/// Name of the journal file holding a batch that is being applied.
const JOURNAL_FILENAME: &str = ".journal";

/// Local filesystem document store.
///
/// Every document is one file below the root directory; key segments map
/// to directories. Batches are made atomic with a redo journal: the batch
/// is written to the journal first, then applied, then the journal is
/// removed. A journal left behind by an interrupted commit is replayed
/// when the store is opened.
pub struct LocalStore {
    root: PathBuf,
    commit_lock: Mutex<()>,
}

impl LocalStore {
    /// Open a store rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    /// - A pending journal has been replayed
    ///
    /// # Errors
    /// - Permission denied
    /// - Unreadable journal
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let store = Self {
            root,
            commit_lock: Mutex::new(()),
        };
        store.recover().await?;
        Ok(store)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a key to a filesystem path.
    fn to_fs_path(&self, key: &str) -> PathBuf {
        let mut fs_path = self.root.clone();
        for segment in key.split('/') {
            fs_path.push(segment);
        }
        fs_path
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILENAME)
    }

    /// Replay a journal left behind by an interrupted commit.
    async fn recover(&self) -> Result<()> {
        let journal = self.journal_path();
        if !fs::try_exists(&journal).await? {
            return Ok(());
        }

        let content = fs::read(&journal).await?;
        match serde_json::from_slice::<WriteBatch>(&content) {
            Ok(batch) => {
                info!(
                    "Replaying interrupted commit of {} writes in {}",
                    batch.len(),
                    self.root.display()
                );
                self.apply(&batch).await?;
            }
            Err(e) => {
                // The journal is renamed into place only once complete, so a
                // corrupt journal means the commit never started
                warn!("Discarding unreadable journal: {}", e);
            }
        }

        fs::remove_file(&journal).await?;
        Ok(())
    }

    /// Write `data` to `target` through a temporary file and a rename.
    async fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| Error::Storage(format!("No parent for {}", target.display())))?;
        fs::create_dir_all(parent).await?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Storage(format!("Invalid file name: {}", target.display())))?;
        let temp = parent.join(format!(".{}.tmp", file_name));

        fs::write(&temp, data).await?;
        fs::rename(&temp, target).await?;
        Ok(())
    }

    /// Apply the writes of a batch in order. Safe to repeat.
    async fn apply(&self, batch: &WriteBatch) -> Result<()> {
        for op in batch.ops() {
            match op {
                WriteOp::Put { key, data } => {
                    Self::write_atomic(&self.to_fs_path(key), data).await?;
                }
                WriteOp::Delete { key } => {
                    let fs_path = self.to_fs_path(key);
                    if fs::try_exists(&fs_path).await? {
                        fs::remove_file(&fs_path).await?;
                        self.prune_empty_parents(&fs_path).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove directories left empty by a delete, up to the root.
    async fn prune_empty_parents(&self, fs_path: &Path) -> Result<()> {
        let mut current = fs_path.parent();
        while let Some(dir) = current {
            if dir == self.root {
                break;
            }
            let mut entries = fs::read_dir(dir).await?;
            if entries.next_entry().await?.is_some() {
                break;
            }
            fs::remove_dir(dir).await?;
            current = dir.parent();
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let fs_path = self.to_fs_path(key);

        if !fs::try_exists(&fs_path).await? || fs::metadata(&fs_path).await?.is_dir() {
            return Ok(None);
        }

        Ok(Some(fs::read(&fs_path).await?))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let fs_path = if prefix.is_empty() {
            self.root.clone()
        } else {
            validate_key(prefix)?;
            self.to_fs_path(prefix)
        };

        if !fs::try_exists(&fs_path).await? || !fs::metadata(&fs_path).await?.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&fs_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        Ok(names)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.commit_lock.lock().await;

        let journal = serde_json::to_vec(&batch).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::write_atomic(&self.journal_path(), &journal).await?;

        self.apply(&batch).await?;

        fs::remove_file(self.journal_path()).await?;
        debug!("Committed {} writes to {}", batch.len(), self.root.display());
        Ok(())
    }
}
