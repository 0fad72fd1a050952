//! Snapshot histories.
//!
//! A history is one independently-versioned copy of the synchronized
//! folder. Each snapshot captures the complete tree at one point in time;
//! diffs between snapshots are derived from the trees.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use synctool_common::{Error, Result, SnapshotId};

use crate::diff::{FileSystemDiff, MultiFileSystemDiff, PathFilter};
use crate::store::{join_key, validate_key, DocumentStore, WriteBatch};
use crate::tree::Directory;

/// An immutable capture of a history's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Name of the owning history.
    pub history: String,
    /// Position within the history, starting at 1.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub tree: Directory,
}

/// One versioned copy of the synchronized folder.
#[async_trait]
pub trait History: Send + Sync {
    /// Name of the history, unique within a group.
    fn name(&self) -> &str;

    /// All snapshots in chronological order.
    async fn snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Record a new snapshot of `tree`.
    ///
    /// # Postconditions
    /// - The new snapshot is the latest one
    async fn create_snapshot(&self, tree: &Directory) -> Result<Snapshot>;

    /// The most recent snapshot, if any.
    async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshots().await?.pop())
    }

    /// Look up a snapshot by id.
    ///
    /// # Errors
    /// - `SnapshotNotFound` if the history has no such snapshot
    async fn snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.snapshots()
            .await?
            .into_iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| Error::SnapshotNotFound(format!("{} in history '{}'", id, self.name())))
    }

    /// Diff the history between two snapshots.
    ///
    /// `from = None` compares against the empty origin. Each path's change
    /// list holds one change per intermediate snapshot transition in which
    /// the path changed, in chronological order.
    ///
    /// # Errors
    /// - `SnapshotNotFound` if either bound is unknown
    /// - `InvalidRange` if `from` is newer than `to`
    async fn compare_snapshots(
        &self,
        from: Option<&SnapshotId>,
        to: &SnapshotId,
        filter: &PathFilter,
    ) -> Result<FileSystemDiff> {
        let snapshots = self.snapshots().await?;
        let position = |id: &SnapshotId| {
            snapshots
                .iter()
                .position(|s| &s.id == id)
                .ok_or_else(|| Error::SnapshotNotFound(format!("{} in history '{}'", id, self.name())))
        };

        let end = position(to)?;
        let origin = Directory::new();
        let trees: Vec<&Directory> = match from {
            Some(from_id) => {
                let start = position(from_id)?;
                if start > end {
                    return Err(Error::InvalidRange(format!(
                        "Snapshot {} is newer than {} in history '{}'",
                        from_id,
                        to,
                        self.name()
                    )));
                }
                snapshots[start..=end].iter().map(|s| &s.tree).collect()
            }
            None => std::iter::once(&origin)
                .chain(snapshots[..=end].iter().map(|s| &s.tree))
                .collect(),
        };

        FileSystemDiff::from_trees(self.name(), from.cloned(), Some(to.clone()), &trees, filter)
    }

    /// Diff the history from `from` (or the origin) to its latest snapshot.
    async fn changes_since(
        &self,
        from: Option<&SnapshotId>,
        filter: &PathFilter,
    ) -> Result<FileSystemDiff> {
        match self.latest_snapshot().await? {
            Some(latest) => self.compare_snapshots(from, &latest.id, filter).await,
            None => Ok(FileSystemDiff::empty(self.name(), None, Directory::new())),
        }
    }
}

/// Diff every history from its recorded boundary to its latest snapshot.
///
/// Histories without an entry in `boundaries` are compared against the
/// empty origin.
pub async fn get_changes(
    histories: &[Arc<dyn History>],
    boundaries: &BTreeMap<String, SnapshotId>,
    filter: &PathFilter,
) -> Result<MultiFileSystemDiff> {
    let mut diffs = Vec::with_capacity(histories.len());
    for history in histories {
        let diff = history
            .changes_since(boundaries.get(history.name()), filter)
            .await?;
        debug!(
            "History '{}': {} changed paths",
            history.name(),
            diff.change_lists.len()
        );
        diffs.push(diff);
    }
    Ok(MultiFileSystemDiff::new(diffs))
}

/// A history kept in a document store.
///
/// Snapshots are stored as JSON documents under
/// `histories/{name}/snapshots/{sequence}` with a zero-padded sequence so
/// the store's sorted listing is chronological.
pub struct StoreHistory<S: DocumentStore + ?Sized = dyn DocumentStore> {
    name: String,
    store: Arc<S>,
    create_lock: Mutex<()>,
}

impl<S: DocumentStore + ?Sized> StoreHistory<S> {
    /// Create a history handle.
    ///
    /// # Errors
    /// - `name` is not usable as a store key segment
    pub fn new(name: impl Into<String>, store: Arc<S>) -> Result<Self> {
        let name = name.into();
        if name.contains('/') {
            return Err(Error::InvalidInput(format!("Invalid history name: {}", name)));
        }
        validate_key(&name)?;
        Ok(Self {
            name,
            store,
            create_lock: Mutex::new(()),
        })
    }

    fn collection(&self) -> String {
        join_key(&["histories", &self.name, "snapshots"])
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> History for StoreHistory<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        let collection = self.collection();
        let mut snapshots = Vec::new();
        for entry in self.store.list(&collection).await? {
            let key = join_key(&[&collection, &entry]);
            let Some(data) = self.store.get(&key).await? else {
                continue;
            };
            let snapshot: Snapshot =
                serde_json::from_slice(&data).map_err(|e| Error::Serialization(e.to_string()))?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    async fn create_snapshot(&self, tree: &Directory) -> Result<Snapshot> {
        let _guard = self.create_lock.lock().await;

        let sequence = self
            .latest_snapshot()
            .await?
            .map_or(1, |latest| latest.sequence + 1);
        let snapshot = Snapshot {
            id: SnapshotId::generate(),
            history: self.name.clone(),
            sequence,
            created_at: Utc::now(),
            tree: tree.clone(),
        };

        let data = serde_json::to_vec(&snapshot).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut batch = WriteBatch::new();
        batch.put(
            join_key(&[&self.collection(), &format!("{:020}", sequence)]),
            data,
        );
        self.store.commit(batch).await?;

        info!(
            "Created snapshot {} (#{}) of history '{}' with {} files",
            snapshot.id,
            sequence,
            self.name,
            tree.file_count()
        );
        Ok(snapshot)
    }
}
