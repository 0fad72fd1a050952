//! Applying queued actions to a history.

use tracing::{info, warn};

use synctool_common::{Error, Result, SnapshotId};

use crate::action::SyncAction;
use crate::conflict::SyncActionSet;
use crate::group::Group;
use crate::state::SyncActionState;

/// Outcome of applying a history's queued actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Snapshot created from the updated tree; `None` if nothing was queued.
    pub snapshot: Option<SnapshotId>,
    pub completed: usize,
}

/// Applies queued sync actions to the latest snapshot of a history.
pub struct ActionApplier;

impl ActionApplier {
    /// Apply every queued action that targets `target`.
    ///
    /// The actions are applied, in order, to the history's latest tree and
    /// the result is recorded as a new snapshot. While applying they are
    /// `Active`; afterwards they are `Completed`, or `Cancelled` if they did
    /// not fit the tree.
    ///
    /// # Errors
    /// - `GroupOpened` if the group is already opened
    /// - `NotFound` if the group has no such history
    /// - `InvalidOperation` while any conflict is pending; no action changes
    ///   state
    /// - `NotApplicable` if an action does not fit the tree; the actions
    ///   are cancelled
    pub async fn apply(group: &Group, target: &str) -> Result<ApplyReport> {
        let _guard = group.open_exclusive()?;
        let history = group.history(target)?;
        let service = group.action_service();

        let (conflicts, ordinary): (Vec<SyncAction>, Vec<SyncAction>) = service
            .pending_items()
            .await?
            .into_iter()
            .partition(SyncAction::is_conflict);
        let queued: Vec<SyncAction> = ordinary
            .into_iter()
            .filter(|a| {
                a.state() == SyncActionState::Queued
                    && a.target().eq_ignore_ascii_case(history.name())
            })
            .collect();
        if queued.is_empty() {
            info!("No queued actions for history '{}'", history.name());
            return Ok(ApplyReport::default());
        }

        let tree = history
            .latest_snapshot()
            .await?
            .map(|s| s.tree)
            .unwrap_or_default();
        let set = SyncActionSet::new(conflicts.into_iter().chain(queued.iter().cloned()).collect());
        let outcome = match set.apply_to(&tree) {
            Err(e @ Error::InvalidOperation(_)) => return Err(e),
            outcome => outcome,
        };

        let active = Self::transition(&queued, SyncActionState::Active)?;
        service.update_items(&active).await?;

        match outcome {
            Ok(updated) => {
                let snapshot = history.create_snapshot(&updated).await?;
                service
                    .update_items(&Self::transition(&active, SyncActionState::Completed)?)
                    .await?;
                info!(
                    "Applied {} actions to history '{}' as snapshot {}",
                    active.len(),
                    history.name(),
                    snapshot.id
                );
                Ok(ApplyReport {
                    snapshot: Some(snapshot.id),
                    completed: active.len(),
                })
            }
            Err(e) => {
                warn!("Cancelling {} actions for '{}': {}", active.len(), history.name(), e);
                service
                    .update_items(&Self::transition(&active, SyncActionState::Cancelled)?)
                    .await?;
                Err(e)
            }
        }
    }

    fn transition(actions: &[SyncAction], state: SyncActionState) -> Result<Vec<SyncAction>> {
        actions.iter().map(|a| a.with_state(state)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synchronizer::Synchronizer;
    use chrono::{TimeZone, Utc};
    use synctool_common::{File, SyncPath};
    use synctool_storage::Directory;

    fn file(path: &str, secs: i64) -> File {
        File::new(
            SyncPath::parse(path).unwrap(),
            Utc.timestamp_opt(secs, 0).unwrap(),
            secs as u64,
        )
    }

    async fn snapshot(group: &Group, history: &str, files: &[File]) {
        let mut tree = Directory::new();
        for f in files {
            tree.add_file(f).unwrap();
        }
        group
            .history(history)
            .unwrap()
            .create_snapshot(&tree)
            .await
            .unwrap();
    }

    async fn count(group: &Group, state: SyncActionState) -> usize {
        group.action_service().items_in_state(state).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_apply_completes_and_converges() {
        let group = Group::in_memory("home", &["a", "b"]).unwrap();
        snapshot(&group, "a", &[file("/x", 1), file("/d/y", 2)]).await;
        Synchronizer::synchronize(&group).await.unwrap();

        let report = ActionApplier::apply(&group, "b").await.unwrap();
        assert_eq!(report.completed, 2);
        assert!(report.snapshot.is_some());
        assert_eq!(count(&group, SyncActionState::Completed).await, 2);

        let latest = group.history("b").unwrap().latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.tree.file_count(), 2);

        // The next round sees both histories in agreement
        let sync = Synchronizer::synchronize(&group).await.unwrap();
        assert_eq!(sync.actions_added, 0);
        assert!(group.action_service().pending_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_with_nothing_queued() {
        let group = Group::in_memory("home", &["a", "b"]).unwrap();
        let report = ActionApplier::apply(&group, "a").await.unwrap();
        assert_eq!(report, ApplyReport::default());
        assert!(matches!(
            ActionApplier::apply(&group, "c").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_conflict_blocks_apply() {
        let group = Group::in_memory("home", &["a", "b", "c"]).unwrap();
        snapshot(&group, "a", &[file("/f", 1)]).await;
        snapshot(&group, "b", &[file("/f", 2)]).await;
        snapshot(&group, "c", &[file("/g", 1)]).await;
        Synchronizer::synchronize(&group).await.unwrap();

        let queued_before = count(&group, SyncActionState::Queued).await;
        assert!(matches!(
            ActionApplier::apply(&group, "a").await,
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(count(&group, SyncActionState::Queued).await, queued_before);
        assert_eq!(count(&group, SyncActionState::Active).await, 0);
    }

    #[tokio::test]
    async fn test_inapplicable_actions_are_cancelled() {
        let group = Group::in_memory("home", &["a", "b"]).unwrap();
        snapshot(&group, "a", &[file("/f", 1)]).await;
        Synchronizer::synchronize(&group).await.unwrap();

        // b creates the file on its own before applying
        snapshot(&group, "b", &[file("/f", 5)]).await;

        assert!(matches!(
            ActionApplier::apply(&group, "b").await,
            Err(Error::NotApplicable(_))
        ));
        assert_eq!(count(&group, SyncActionState::Cancelled).await, 1);
        assert_eq!(group.history("b").unwrap().snapshots().await.unwrap().len(), 1);
    }
}
