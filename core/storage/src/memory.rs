//! In-memory document store for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use synctool_common::Result;

use crate::store::{validate_key, DocumentStore, WriteBatch, WriteOp};

/// In-memory document store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            validate_key(prefix)?;
            format!("{}/", prefix)
        };

        let documents = self.documents.read().await;
        let mut children: Vec<String> = Vec::new();
        for key in documents.range(prefix.clone()..).map(|(k, _)| k) {
            let Some(relative) = key.strip_prefix(&prefix) else {
                break;
            };
            let child = relative.split('/').next().unwrap_or(relative);
            // Keys are sorted, so duplicates are adjacent
            if children.last().map(String::as_str) != Some(child) {
                children.push(child.to_string());
            }
        }

        Ok(children)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        batch.validate()?;

        // Holding the write lock for the whole batch keeps it atomic
        let mut documents = self.documents.write().await;
        for op in batch.ops() {
            match op {
                WriteOp::Put { key, data } => {
                    documents.insert(key.clone(), data.clone());
                }
                WriteOp::Delete { key } => {
                    documents.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("a/b", b"Hello, World!".to_vec());
        store.commit(batch).await.unwrap();

        assert_eq!(store.get("a/b").await.unwrap(), Some(b"Hello, World!".to_vec()));
        assert_eq!(store.get("a/c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("x/1", vec![1]).put("x/2", vec![2]);
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("x/1").delete("x/missing");
        store.commit(batch).await.unwrap();

        assert_eq!(store.list("x").await.unwrap(), vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn test_list_direct_children() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .put("actions/queued/p1/id1", vec![])
            .put("actions/queued/p1/id2", vec![])
            .put("actions/queued/p2/id3", vec![])
            .put("actions/active/p1/id4", vec![])
            .put("actionsx/other", vec![]);
        store.commit(batch).await.unwrap();

        assert_eq!(store.list("actions").await.unwrap(), vec!["active", "queued"]);
        assert_eq!(store.list("actions/queued").await.unwrap(), vec!["p1", "p2"]);
        assert_eq!(store.list("actions/queued/p1").await.unwrap(), vec!["id1", "id2"]);
        assert!(store.list("actions/cancelled").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_batch_writes_nothing() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("good/key", vec![1]).put("bad//key", vec![2]);

        assert!(store.commit(batch).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new();
        let other = store.clone();
        let mut batch = WriteBatch::new();
        batch.put("k", vec![9]);
        store.commit(batch).await.unwrap();

        assert_eq!(other.len().await, 1);
    }
}
