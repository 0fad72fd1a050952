//! Conflict detection and sync action derivation.
//!
//! Each change graph is classified from its sinks, the versions every
//! history ended up with. A single surviving version becomes ordinary
//! actions for the histories that lag behind it; several surviving
//! versions become one conflict action for the group.

use tracing::debug;

use synctool_common::{Error, FileReference, Result};
use synctool_storage::Directory;

use crate::action::{SyncAction, SyncActionKind, SyncActionVisitor};
use crate::change_graph::{ChangeGraph, Version};
use crate::graph::{AcyclicGraph, NodeIndex, START};

/// Outcome of classifying one change graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Nothing to do for the path.
    NoAction,
    /// Every history should end up with this version.
    Apply(Version),
    MultipleVersionConflict(Vec<FileReference>),
    ModificationDeletionConflict {
        deleted: FileReference,
        modified: FileReference,
    },
}

impl Classification {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Classification::MultipleVersionConflict(_)
                | Classification::ModificationDeletionConflict { .. }
        )
    }
}

/// The version all start-adjacent nodes agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Baseline {
    Known(Version),
    Ambiguous,
}

fn baseline(acyclic: &AcyclicGraph<Version>) -> Baseline {
    let mut values = acyclic
        .successors(START)
        .iter()
        .filter_map(|&i| acyclic.value(i));
    match values.next() {
        Some(first) if values.all(|v| v == first) => Baseline::Known(first.clone()),
        _ => Baseline::Ambiguous,
    }
}

/// Classify a change graph.
///
/// Only sinks holding some history's current version take part; a sink
/// left behind by a revisited version is not a candidate. When every
/// candidate equals the baseline but the heads still differ, the histories
/// that moved past the baseline came back to it and the rest follow.
pub fn classify(change_graph: &ChangeGraph) -> Classification {
    if change_graph.is_converged() {
        return Classification::NoAction;
    }

    let acyclic = change_graph.graph.to_acyclic();
    let baseline = baseline(&acyclic);
    let sinks = acyclic.sinks();

    let mut distinct = distinct_values(&acyclic, &sinks, |value| {
        change_graph.heads.values().any(|head| head == value)
    });
    if distinct.is_empty() {
        distinct = distinct_values(&acyclic, &sinks, |_| true);
    }

    if let Baseline::Known(base) = &baseline {
        if distinct.iter().all(|(_, v)| *v == base) {
            return Classification::Apply(base.clone());
        }
        distinct.retain(|(_, v)| *v != base);
    }

    if let [(_, only)] = distinct.as_slice() {
        return Classification::Apply((*only).clone());
    }

    let modified: Vec<FileReference> = distinct
        .iter()
        .filter_map(|(_, v)| (*v).clone())
        .collect();
    let deletion = distinct.iter().find(|(_, v)| v.is_none()).map(|(i, _)| *i);

    match (deletion, modified.as_slice()) {
        (Some(deleted_sink), [modified]) => Classification::ModificationDeletionConflict {
            deleted: deleted_version(&acyclic, deleted_sink, &baseline, modified),
            modified: modified.clone(),
        },
        _ => Classification::MultipleVersionConflict(modified),
    }
}

/// The distinct values of `sinks` accepted by `keep`, first sink first.
fn distinct_values<'a>(
    acyclic: &'a AcyclicGraph<Version>,
    sinks: &[NodeIndex],
    keep: impl Fn(&Version) -> bool,
) -> Vec<(NodeIndex, &'a Version)> {
    let mut distinct: Vec<(NodeIndex, &Version)> = Vec::new();
    for &sink in sinks {
        if let Some(value) = acyclic.value(sink) {
            if keep(value) && !distinct.iter().any(|(_, v)| *v == value) {
                distinct.push((sink, value));
            }
        }
    }
    distinct
}

/// The version a deletion removed: the sink's predecessor, else the baseline.
fn deleted_version(
    acyclic: &AcyclicGraph<Version>,
    sink: NodeIndex,
    baseline: &Baseline,
    modified: &FileReference,
) -> FileReference {
    acyclic
        .predecessors(sink)
        .into_iter()
        .find_map(|p| acyclic.value(p).cloned().flatten())
        .or_else(|| match baseline {
            Baseline::Known(Some(base)) => Some(base.clone()),
            _ => None,
        })
        .unwrap_or_else(|| {
            FileReference::for_path(modified.path().clone()).unwrap_or_else(|_| modified.clone())
        })
}

/// The ordinary action that takes a history from `head` to `winner`.
fn transition_kind(head: &Version, winner: &Version) -> Option<SyncActionKind> {
    match (head, winner) {
        (None, Some(new_file)) => Some(SyncActionKind::Add {
            new_file: new_file.clone(),
        }),
        (Some(removed_file), None) => Some(SyncActionKind::Remove {
            removed_file: removed_file.clone(),
        }),
        (Some(old), Some(new)) if old != new => Some(SyncActionKind::Replace {
            old_version: old.clone(),
            new_version: new.clone(),
        }),
        _ => None,
    }
}

/// An ordered set of sync actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncActionSet {
    actions: Vec<SyncAction>,
}

impl SyncActionSet {
    pub fn new(actions: Vec<SyncAction>) -> Self {
        Self { actions }
    }

    /// Derive the actions for one change graph.
    ///
    /// Ordinary outcomes yield one action per history whose version differs
    /// from the winning one; conflicts yield a single action targeted at
    /// `group`.
    pub fn from_change_graph(
        change_graph: &ChangeGraph,
        group: &str,
        sync_point_id: u64,
    ) -> Result<Self> {
        let classification = classify(change_graph);
        debug!("{}: {:?}", change_graph.path, classification);

        let actions = match classification {
            Classification::NoAction => Vec::new(),
            Classification::Apply(winner) => change_graph
                .heads
                .iter()
                .filter_map(|(history, head)| {
                    transition_kind(head, &winner).map(|kind| (history, kind))
                })
                .map(|(history, kind)| SyncAction::new(history.as_str(), sync_point_id, kind))
                .collect::<Result<Vec<_>>>()?,
            Classification::MultipleVersionConflict(versions) => vec![SyncAction::new(
                group,
                sync_point_id,
                SyncActionKind::MultipleVersionConflict { versions },
            )?],
            Classification::ModificationDeletionConflict { deleted, modified } => {
                vec![SyncAction::new(
                    group,
                    sync_point_id,
                    SyncActionKind::ModificationDeletionConflict { deleted, modified },
                )?]
            }
        };

        Ok(Self { actions })
    }

    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<SyncAction> {
        self.actions
    }

    pub fn push(&mut self, action: SyncAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        self.actions.iter().any(SyncAction::is_conflict)
    }

    /// Apply the actions, in order, to a copy of `directory`.
    ///
    /// # Errors
    /// - `InvalidOperation` if the set contains a conflict
    /// - `NotApplicable` if an action does not fit the tree: adding an
    ///   existing or incompletely described file, or removing a file that
    ///   is missing or is not the expected version
    pub fn apply_to(&self, directory: &Directory) -> Result<Directory> {
        if let Some(conflict) = self.actions.iter().find(|a| a.is_conflict()) {
            return Err(Error::InvalidOperation(format!(
                "Cannot apply a set containing conflict {} at {}",
                conflict.id(),
                conflict.path()
            )));
        }

        let mut tree = directory.clone();
        let mut applier = TreeApplier { tree: &mut tree };
        for action in &self.actions {
            action.accept(&mut applier)?;
        }
        Ok(tree)
    }
}

/// Applies ordinary actions to a tree.
struct TreeApplier<'a> {
    tree: &'a mut Directory,
}

impl TreeApplier<'_> {
    fn add(&mut self, new_file: &FileReference) -> Result<()> {
        if self.tree.contains_file(new_file.path()) {
            return Err(Error::NotApplicable(format!(
                "File already exists: {}",
                new_file.path()
            )));
        }
        let file = new_file.to_file().ok_or_else(|| {
            Error::NotApplicable(format!("Incomplete file reference: {}", new_file))
        })?;
        self.tree
            .add_file(&file)
            .map_err(|e| Error::NotApplicable(e.to_string()))
    }

    fn remove(&mut self, removed_file: &FileReference) -> Result<()> {
        match self.tree.file(removed_file.path()) {
            Some(existing) if removed_file.matches(&existing) => {
                self.tree.remove_file(removed_file.path())?;
                Ok(())
            }
            Some(existing) => Err(Error::NotApplicable(format!(
                "Expected {} but found {}",
                removed_file,
                existing.to_reference()
            ))),
            None => Err(Error::NotApplicable(format!(
                "File not found: {}",
                removed_file.path()
            ))),
        }
    }

    fn conflict(action: &SyncAction) -> Result<()> {
        Err(Error::InvalidOperation(format!(
            "Conflict {} cannot be applied",
            action.id()
        )))
    }
}

impl SyncActionVisitor for TreeApplier<'_> {
    type Output = Result<()>;

    fn visit_add(&mut self, _: &SyncAction, new_file: &FileReference) -> Result<()> {
        self.add(new_file)
    }

    fn visit_remove(&mut self, _: &SyncAction, removed_file: &FileReference) -> Result<()> {
        self.remove(removed_file)
    }

    fn visit_replace(
        &mut self,
        _: &SyncAction,
        old_version: &FileReference,
        new_version: &FileReference,
    ) -> Result<()> {
        self.remove(old_version)?;
        self.add(new_version)
    }

    fn visit_multiple_version_conflict(
        &mut self,
        action: &SyncAction,
        _: &[FileReference],
    ) -> Result<()> {
        Self::conflict(action)
    }

    fn visit_modification_deletion_conflict(
        &mut self,
        action: &SyncAction,
        _: &FileReference,
        _: &FileReference,
    ) -> Result<()> {
        Self::conflict(action)
    }
}
