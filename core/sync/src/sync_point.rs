//! Sync points: the recorded boundaries of synchronization rounds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use synctool_common::{Error, Result, SnapshotId};
use synctool_storage::{DocumentStore, PathFilter, WriteBatch};

use crate::codec;

const COLLECTION: &str = "syncpoints";

/// The snapshots a history was synchronized across.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    /// Lower bound; `None` for the empty origin.
    pub from: Option<SnapshotId>,
    /// Upper bound; `None` if the history had no snapshots.
    pub to: Option<SnapshotId>,
}

/// The boundary of one completed synchronization round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPoint {
    pub id: u64,
    /// Snapshot range per history name.
    pub histories: BTreeMap<String, HistoryRange>,
    /// The filter the round was computed with.
    pub filter: PathFilter,
}

impl SyncPoint {
    /// Upper bounds of all histories that had a snapshot.
    pub fn boundaries(&self) -> BTreeMap<String, SnapshotId> {
        self.histories
            .iter()
            .filter_map(|(name, range)| range.to.clone().map(|id| (name.clone(), id)))
            .collect()
    }
}

/// Persistence of sync points.
pub struct SyncPointService {
    store: Arc<dyn DocumentStore>,
}

impl SyncPointService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn key(id: u64) -> String {
        format!("{}/{:020}", COLLECTION, id)
    }

    /// The most recent sync point, if any round has completed.
    pub async fn latest(&self) -> Result<Option<SyncPoint>> {
        match self.store.list(COLLECTION).await?.last() {
            Some(name) => self.read(&format!("{}/{}", COLLECTION, name)).await,
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: u64) -> Result<Option<SyncPoint>> {
        self.read(&Self::key(id)).await
    }

    /// All sync points, oldest first.
    pub async fn all(&self) -> Result<Vec<SyncPoint>> {
        let mut points = Vec::new();
        for name in self.store.list(COLLECTION).await? {
            if let Some(point) = self.read(&format!("{}/{}", COLLECTION, name)).await? {
                points.push(point);
            }
        }
        Ok(points)
    }

    /// Record a sync point.
    ///
    /// # Errors
    /// - `InvalidInput` if the id is not greater than the latest one
    pub async fn add(&self, point: &SyncPoint) -> Result<()> {
        let latest_id = self.latest().await?.map_or(0, |p| p.id);
        if point.id <= latest_id {
            return Err(Error::InvalidInput(format!(
                "Sync point {} is not newer than {}",
                point.id, latest_id
            )));
        }

        let mut batch = WriteBatch::new();
        batch.put(Self::key(point.id), codec::encode_sync_point(point)?);
        self.store.commit(batch).await?;

        info!("Recorded sync point {}", point.id);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<SyncPoint>> {
        match self.store.get(key).await? {
            Some(data) => codec::decode_sync_point(&data).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synctool_storage::MemoryStore;

    fn point(id: u64, to: Option<&str>) -> SyncPoint {
        let mut histories = BTreeMap::new();
        histories.insert(
            "a".to_string(),
            HistoryRange {
                from: None,
                to: to.map(|s| SnapshotId::new(s).unwrap()),
            },
        );
        histories.insert("b".to_string(), HistoryRange::default());
        SyncPoint {
            id,
            histories,
            filter: PathFilter::all(),
        }
    }

    #[tokio::test]
    async fn test_latest_and_get() {
        let service = SyncPointService::new(Arc::new(MemoryStore::new()));
        assert!(service.latest().await.unwrap().is_none());

        service.add(&point(1, Some("s1"))).await.unwrap();
        service.add(&point(2, Some("s2"))).await.unwrap();

        let latest = service.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, 2);
        assert_eq!(service.get(1).await.unwrap().unwrap(), point(1, Some("s1")));
        assert!(service.get(7).await.unwrap().is_none());
        assert_eq!(service.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ids_must_increase() {
        let service = SyncPointService::new(Arc::new(MemoryStore::new()));
        service.add(&point(3, None)).await.unwrap();

        assert!(matches!(
            service.add(&point(3, None)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(service.add(&point(2, None)).await.is_err());
    }

    #[tokio::test]
    async fn test_ordering_beyond_nine() {
        let service = SyncPointService::new(Arc::new(MemoryStore::new()));
        for id in [9, 10, 11] {
            service.add(&point(id, None)).await.unwrap();
        }
        assert_eq!(service.latest().await.unwrap().unwrap().id, 11);
    }

    #[test]
    fn test_boundaries_skip_empty_histories() {
        let boundaries = point(1, Some("s1")).boundaries();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries["a"], SnapshotId::new("S1").unwrap());
    }
}
