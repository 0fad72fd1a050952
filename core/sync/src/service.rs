//! Persistence of sync actions.
//!
//! Actions are stored one document each under
//! `actions/{state}/{path}/{id}`. The path segment is the lower-cased,
//! percent-encoded file path, so looking up actions by state, by path or
//! by both only ever touches the matching buckets.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use synctool_common::{Error, Result, SyncPath};
use synctool_storage::{DocumentStore, WriteBatch};

use crate::action::SyncAction;
use crate::codec;
use crate::state::SyncActionState;

const COLLECTION: &str = "actions";

/// Characters escaped in a path bucket name.
const BUCKET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

fn encode_path(path: &SyncPath) -> String {
    utf8_percent_encode(&path.normalized(), BUCKET).to_string()
}

fn decode_path(bucket: &str) -> Result<SyncPath> {
    let decoded = percent_decode_str(bucket)
        .decode_utf8()
        .map_err(|e| Error::Format(format!("Invalid action bucket '{}': {}", bucket, e)))?;
    SyncPath::parse(&decoded)
}

fn state_key(state: SyncActionState) -> String {
    format!("{}/{}", COLLECTION, state.as_str())
}

fn bucket_key(state: SyncActionState, path: &SyncPath) -> String {
    format!("{}/{}", state_key(state), encode_path(path))
}

fn document_key(state: SyncActionState, path: &SyncPath, id: Uuid) -> String {
    format!("{}/{}", bucket_key(state, path), id)
}

fn action_key(action: &SyncAction) -> String {
    document_key(action.state(), action.path(), action.id())
}

/// Stores and queries sync actions.
pub struct SyncActionService {
    store: Arc<dyn DocumentStore>,
}

impl SyncActionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store new actions in one atomic commit.
    ///
    /// # Errors
    /// - `DuplicateSyncAction` if an id is already stored in its bucket or
    ///   occurs twice in `actions`; nothing is written
    pub async fn add_items(&self, actions: &[SyncAction]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut batch = WriteBatch::new();

        for action in actions {
            if !seen.insert(action.id()) {
                return Err(Error::DuplicateSyncAction(action.id()));
            }
            let key = action_key(action);
            if self.store.get(&key).await?.is_some() {
                return Err(Error::DuplicateSyncAction(action.id()));
            }
            batch.put(key, codec::encode_action(action)?);
        }

        self.store.commit(batch).await?;
        debug!("Added {} sync actions", actions.len());
        Ok(())
    }

    /// Store the new state of existing actions in one atomic commit.
    ///
    /// The stored copy is looked up by path; its record is moved to the
    /// bucket of the new state.
    ///
    /// # Errors
    /// - `InvalidInput` if an id occurs twice in `actions`
    /// - `SyncActionNotFound` if an action is not stored
    /// - `InvalidTransition` if the stored state cannot move to the new one
    pub async fn update_items(&self, actions: &[SyncAction]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut batch = WriteBatch::new();

        for action in actions {
            if !seen.insert(action.id()) {
                return Err(Error::InvalidInput(format!(
                    "Sync action {} is updated twice in one batch",
                    action.id()
                )));
            }
            let stored = self
                .find_by_path(action.path(), action.id())
                .await?
                .ok_or(Error::SyncActionNotFound(action.id()))?;
            stored.state().transition_to(action.state())?;

            batch.delete(action_key(&stored));
            batch.put(action_key(action), codec::encode_action(action)?);
        }

        self.store.commit(batch).await?;
        info!("Updated {} sync actions", actions.len());
        Ok(())
    }

    /// Delete actions in one atomic commit.
    ///
    /// # Errors
    /// - `SyncActionNotFound` if an action is not stored under its current
    ///   state and path; nothing is deleted
    pub async fn remove_items(&self, actions: &[SyncAction]) -> Result<()> {
        let mut batch = WriteBatch::new();

        for action in actions {
            let key = action_key(action);
            if self.store.get(&key).await?.is_none() {
                return Err(Error::SyncActionNotFound(action.id()));
            }
            batch.delete(key);
        }

        self.store.commit(batch).await?;
        debug!("Removed {} sync actions", actions.len());
        Ok(())
    }

    /// Every stored action.
    pub async fn all_items(&self) -> Result<Vec<SyncAction>> {
        let mut actions = Vec::new();
        for state in SyncActionState::ALL {
            actions.extend(self.items_in_state(state).await?);
        }
        Ok(actions)
    }

    /// Actions that are queued or active.
    pub async fn pending_items(&self) -> Result<Vec<SyncAction>> {
        let mut actions = Vec::new();
        for state in SyncActionState::PENDING {
            actions.extend(self.items_in_state(state).await?);
        }
        Ok(actions)
    }

    pub async fn items_in_state(&self, state: SyncActionState) -> Result<Vec<SyncAction>> {
        let mut actions = Vec::new();
        for bucket in self.store.list(&state_key(state)).await? {
            let path = decode_path(&bucket)?;
            actions.extend(self.items_in_state_for_path(state, &path).await?);
        }
        Ok(actions)
    }

    /// Actions for a path in any state.
    pub async fn items_for_path(&self, path: &SyncPath) -> Result<Vec<SyncAction>> {
        let mut actions = Vec::new();
        for state in SyncActionState::ALL {
            actions.extend(self.items_in_state_for_path(state, path).await?);
        }
        Ok(actions)
    }

    pub async fn items_in_state_for_path(
        &self,
        state: SyncActionState,
        path: &SyncPath,
    ) -> Result<Vec<SyncAction>> {
        let bucket = bucket_key(state, path);
        let mut actions = Vec::new();
        for id in self.store.list(&bucket).await? {
            if let Some(data) = self.store.get(&format!("{}/{}", bucket, id)).await? {
                actions.push(codec::decode_action(&data)?);
            }
        }
        Ok(actions)
    }

    /// Look up a single action by id in any state.
    pub async fn get(&self, id: Uuid) -> Result<Option<SyncAction>> {
        Ok(self.all_items().await?.into_iter().find(|a| a.id() == id))
    }

    /// Stored actions grouped by path, pending ones only.
    pub async fn pending_by_path(&self) -> Result<HashMap<SyncPath, Vec<SyncAction>>> {
        let mut grouped: HashMap<SyncPath, Vec<SyncAction>> = HashMap::new();
        for action in self.pending_items().await? {
            grouped.entry(action.path().clone()).or_default().push(action);
        }
        Ok(grouped)
    }

    async fn find_by_path(&self, path: &SyncPath, id: Uuid) -> Result<Option<SyncAction>> {
        for state in SyncActionState::ALL {
            let key = document_key(state, path, id);
            if let Some(data) = self.store.get(&key).await? {
                return codec::decode_action(&data).map(Some);
            }
        }
        Ok(None)
    }
}
