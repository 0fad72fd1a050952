//! Synchronization groups.
//!
//! A group bundles the histories that are kept in sync with the document
//! store holding their snapshots, actions and sync points.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use synctool_common::{Error, Result};
use synctool_storage::{
    DocumentStore, GroupGuard, GroupLock, History, LocalStore, MemoryStore, StoreHistory,
};

use crate::config::{GroupConfig, CONFIG_FILENAME, STORE_DIRNAME};
use crate::service::SyncActionService;
use crate::sync_point::SyncPointService;

/// A set of histories synchronized together.
pub struct Group {
    config: GroupConfig,
    store: Arc<dyn DocumentStore>,
    histories: Vec<Arc<dyn History>>,
    lock: GroupLock,
    root: Option<PathBuf>,
}

impl Group {
    /// Create a group over an existing store.
    ///
    /// Every history named in the configuration is kept in `store`.
    ///
    /// # Errors
    /// - Invalid configuration or history names
    pub fn new(config: GroupConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate()?;
        let histories = config
            .histories
            .iter()
            .map(|name| {
                StoreHistory::new(name.as_str(), Arc::clone(&store))
                    .map(|h| Arc::new(h) as Arc<dyn History>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            lock: GroupLock::new(config.name.clone()),
            config,
            store,
            histories,
            root: None,
        })
    }

    /// Create a group kept entirely in memory.
    pub fn in_memory(name: &str, histories: &[&str]) -> Result<Self> {
        let config = GroupConfig::new(
            name,
            histories.iter().map(|h| h.to_string()).collect(),
            Default::default(),
        )?;
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Create a new group in a local directory.
    ///
    /// # Postconditions
    /// - The configuration is written to `dir/synctool.json`
    /// - The document store lives in `dir/store`
    ///
    /// # Errors
    /// - `AlreadyExists` if the directory already holds a group
    /// - I/O errors
    pub async fn init_local(dir: impl AsRef<Path>, config: GroupConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let config_path = dir.join(CONFIG_FILENAME);
        if fs::try_exists(&config_path).await? {
            return Err(Error::AlreadyExists(format!(
                "Group already exists at {}",
                dir.display()
            )));
        }

        config.validate()?;
        fs::create_dir_all(dir).await?;
        fs::write(&config_path, config.to_json()?).await?;
        info!("Created group '{}' at {}", config.name, dir.display());

        Self::open_local(dir).await
    }

    /// Open a group stored in a local directory.
    ///
    /// # Errors
    /// - `NotFound` if the directory holds no group configuration
    /// - Invalid or incompatible configuration
    pub async fn open_local(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config_path = dir.join(CONFIG_FILENAME);
        if !fs::try_exists(&config_path).await? {
            return Err(Error::NotFound(format!(
                "Group configuration not found in {}",
                dir.display()
            )));
        }

        let config = GroupConfig::from_json(&fs::read_to_string(&config_path).await?)?;
        let store = LocalStore::open(dir.join(STORE_DIRNAME)).await?;

        let mut group = Self::new(config, Arc::new(store))?;
        group.root = Some(dir.to_path_buf());
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Directory of a locally stored group.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn histories(&self) -> &[Arc<dyn History>] {
        &self.histories
    }

    /// Look up a history by name, ignoring case.
    ///
    /// # Errors
    /// - `NotFound` if the group has no such history
    pub fn history(&self, name: &str) -> Result<Arc<dyn History>> {
        self.histories
            .iter()
            .find(|h| h.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("History '{}' in group '{}'", name, self.name()))
            })
    }

    pub fn lock(&self) -> &GroupLock {
        &self.lock
    }

    pub fn open_shared(&self) -> Result<GroupGuard> {
        self.lock.open_shared()
    }

    pub fn open_exclusive(&self) -> Result<GroupGuard> {
        self.lock.open_exclusive()
    }

    pub fn action_service(&self) -> SyncActionService {
        SyncActionService::new(self.store())
    }

    pub fn sync_point_service(&self) -> SyncPointService {
        SyncPointService::new(self.store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synctool_storage::{Directory, LockState, PathFilter};
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_group() {
        let group = Group::in_memory("home", &["laptop", "desktop"]).unwrap();
        assert_eq!(group.name(), "home");
        assert_eq!(group.histories().len(), 2);
        assert!(group.history("LAPTOP").is_ok());
        assert!(matches!(group.history("phone"), Err(Error::NotFound(_))));
        assert!(group.root().is_none());
    }

    #[test]
    fn test_group_lock() {
        let group = Group::in_memory("home", &["a"]).unwrap();
        let guard = group.open_exclusive().unwrap();
        assert!(matches!(group.open_shared(), Err(Error::GroupOpened(_))));
        drop(guard);
        assert_eq!(group.lock().state(), LockState::Closed);
    }

    #[tokio::test]
    async fn test_local_group_round_trip() {
        let temp = TempDir::new().unwrap();
        let config = GroupConfig::new(
            "home",
            vec!["laptop".to_string(), "desktop".to_string()],
            PathFilter::all(),
        )
        .unwrap();

        {
            let group = Group::init_local(temp.path(), config.clone()).await.unwrap();
            group
                .history("laptop")
                .unwrap()
                .create_snapshot(&Directory::new())
                .await
                .unwrap();
        }

        assert!(matches!(
            Group::init_local(temp.path(), config.clone()).await,
            Err(Error::AlreadyExists(_))
        ));

        let group = Group::open_local(temp.path()).await.unwrap();
        assert_eq!(group.config(), &config);
        assert_eq!(group.root(), Some(temp.path()));
        let laptop = group.history("laptop").unwrap();
        assert_eq!(laptop.snapshots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_missing_group() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Group::open_local(temp.path()).await,
            Err(Error::NotFound(_))
        ));
    }
}
