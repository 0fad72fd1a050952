//! Synchronization rounds.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use synctool_common::Result;
use synctool_storage::get_changes;

use crate::change_graph::ChangeGraphService;
use crate::conflict::SyncActionSet;
use crate::group::Group;
use crate::state::SyncActionState;
use crate::sync_point::{HistoryRange, SyncPoint};

/// Outcome of one synchronization round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// The recorded sync point; `None` if no history moved.
    pub sync_point_id: Option<u64>,
    pub actions_added: usize,
    pub actions_cancelled: usize,
    /// Conflicts found in this round, including ones already pending.
    pub conflicts: usize,
    pub paths_examined: usize,
    pub duration: Duration,
}

/// Runs synchronization rounds over a group.
pub struct Synchronizer;

impl Synchronizer {
    /// Run one synchronization round.
    ///
    /// Every history is diffed from the previous sync point (or from the
    /// empty origin) to its latest snapshot, and every changed path is
    /// classified. Pending actions count as moves their targets are about
    /// to make. New actions are queued; pending actions of a classified
    /// path that the new outcome no longer contains are cancelled, and
    /// pending actions it still contains are kept as they are. Finally a
    /// sync point records the snapshots the round covered.
    ///
    /// # Errors
    /// - `GroupOpened` if the group is already opened
    /// - Storage and history errors
    pub async fn synchronize(group: &Group) -> Result<SyncReport> {
        let started = Instant::now();
        let _guard = group.open_exclusive()?;

        let points = group.sync_point_service();
        let service = group.action_service();
        let filter = &group.config().filter;

        let last = points.latest().await?;
        let boundaries = last.as_ref().map(SyncPoint::boundaries).unwrap_or_default();
        let changes = get_changes(group.histories(), &boundaries, filter).await?;

        let ranges: BTreeMap<String, HistoryRange> = changes
            .diffs()
            .iter()
            .map(|diff| {
                let range = HistoryRange {
                    from: boundaries.get(&diff.history).cloned(),
                    to: diff.to_snapshot.clone(),
                };
                (diff.history.clone(), range)
            })
            .collect();

        let moved = ranges.iter().any(|(name, range)| {
            let previous = last
                .as_ref()
                .and_then(|p| p.histories.get(name))
                .and_then(|r| r.to.as_ref());
            previous != range.to.as_ref()
        });
        if !moved {
            info!("Group '{}': no history moved since the last round", group.name());
            return Ok(SyncReport {
                duration: started.elapsed(),
                ..SyncReport::default()
            });
        }

        let sync_point_id = last.as_ref().map_or(1, |p| p.id + 1);
        let pending = service.pending_by_path().await?;
        let mut graphs = ChangeGraphService::build(changes.diffs());
        for graph in &mut graphs {
            if let Some(actions) = pending.get(&graph.path) {
                graph.add_pending(actions);
            }
        }

        let mut to_add = Vec::new();
        let mut to_cancel = Vec::new();
        let mut conflicts = 0;

        for graph in &graphs {
            let set = SyncActionSet::from_change_graph(graph, group.name(), sync_point_id)?;
            let existing = pending.get(&graph.path).map(Vec::as_slice).unwrap_or(&[]);

            for action in existing {
                if !set.actions().iter().any(|new| new.same_outcome(action)) {
                    debug!("Cancelling superseded action {}", action);
                    to_cancel.push(action.with_state(SyncActionState::Cancelled)?);
                }
            }
            for action in set.into_actions() {
                if action.is_conflict() {
                    conflicts += 1;
                }
                if !existing.iter().any(|old| old.same_outcome(&action)) {
                    to_add.push(action);
                }
            }
        }

        service.update_items(&to_cancel).await?;
        service.add_items(&to_add).await?;
        points
            .add(&SyncPoint {
                id: sync_point_id,
                histories: ranges,
                filter: filter.clone(),
            })
            .await?;

        let report = SyncReport {
            sync_point_id: Some(sync_point_id),
            actions_added: to_add.len(),
            actions_cancelled: to_cancel.len(),
            conflicts,
            paths_examined: graphs.len(),
            duration: started.elapsed(),
        };
        info!(
            "Group '{}' sync point {}: {} paths, {} actions added, {} cancelled, {} conflicts",
            group.name(),
            sync_point_id,
            report.paths_examined,
            report.actions_added,
            report.actions_cancelled,
            report.conflicts
        );
        Ok(report)
    }
}
