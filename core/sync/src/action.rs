//! Sync actions: persisted units of corrective work or surfaced conflicts.

use std::fmt;
use uuid::Uuid;

use synctool_common::{Error, FileReference, Result, SyncPath};

use crate::state::SyncActionState;

/// What a sync action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncActionKind {
    /// Create a file that the target does not have.
    Add { new_file: FileReference },
    /// Delete the target's copy of a file.
    Remove { removed_file: FileReference },
    /// Overwrite one version with another.
    Replace {
        old_version: FileReference,
        new_version: FileReference,
    },
    /// Histories hold different versions of the file.
    MultipleVersionConflict { versions: Vec<FileReference> },
    /// One history deleted the file while another modified it.
    ModificationDeletionConflict {
        deleted: FileReference,
        modified: FileReference,
    },
}

impl SyncActionKind {
    /// Name of the variant as stored.
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncActionKind::Add { .. } => "Add",
            SyncActionKind::Remove { .. } => "Remove",
            SyncActionKind::Replace { .. } => "Replace",
            SyncActionKind::MultipleVersionConflict { .. } => "MultipleVersionConflict",
            SyncActionKind::ModificationDeletionConflict { .. } => "ModificationDeletionConflict",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SyncActionKind::MultipleVersionConflict { .. }
                | SyncActionKind::ModificationDeletionConflict { .. }
        )
    }

    /// The version an ordinary action expects and the one it leaves behind,
    /// `None` standing for an absent file. Conflicts have no transition.
    pub fn transition(&self) -> Option<(Option<FileReference>, Option<FileReference>)> {
        match self {
            SyncActionKind::Add { new_file } => Some((None, Some(new_file.clone()))),
            SyncActionKind::Remove { removed_file } => Some((Some(removed_file.clone()), None)),
            SyncActionKind::Replace {
                old_version,
                new_version,
            } => Some((Some(old_version.clone()), Some(new_version.clone()))),
            SyncActionKind::MultipleVersionConflict { .. }
            | SyncActionKind::ModificationDeletionConflict { .. } => None,
        }
    }

    /// Every file version the action refers to.
    pub fn versions(&self) -> Vec<&FileReference> {
        match self {
            SyncActionKind::Add { new_file } => vec![new_file],
            SyncActionKind::Remove { removed_file } => vec![removed_file],
            SyncActionKind::Replace {
                old_version,
                new_version,
            } => vec![old_version, new_version],
            SyncActionKind::MultipleVersionConflict { versions } => versions.iter().collect(),
            SyncActionKind::ModificationDeletionConflict { deleted, modified } => {
                vec![deleted, modified]
            }
        }
    }

    /// Validate the versions and return the path they share.
    ///
    /// # Errors
    /// - A multiple-version conflict with fewer than two versions
    /// - Versions that refer to different paths
    pub fn path(&self) -> Result<SyncPath> {
        let versions = self.versions();
        if let SyncActionKind::MultipleVersionConflict { .. } = self {
            if versions.len() < 2 {
                return Err(Error::InvalidInput(
                    "A multiple-version conflict needs at least two versions".to_string(),
                ));
            }
        }

        let first = versions
            .first()
            .ok_or_else(|| Error::InvalidInput("Sync action without versions".to_string()))?
            .path();
        if let Some(other) = versions.iter().find(|v| v.path() != first) {
            return Err(Error::InvalidInput(format!(
                "{} refers to different paths: {} and {}",
                self.type_name(),
                first,
                other.path()
            )));
        }
        Ok(first.clone())
    }

    /// Whether two kinds describe the same outcome.
    ///
    /// Conflict versions are compared regardless of order.
    pub fn same_outcome(&self, other: &SyncActionKind) -> bool {
        match (self, other) {
            (
                SyncActionKind::MultipleVersionConflict { versions: a },
                SyncActionKind::MultipleVersionConflict { versions: b },
            ) => a.len() == b.len() && a.iter().all(|v| b.contains(v)),
            _ => self == other,
        }
    }
}

/// A persisted unit of synchronization work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    id: Uuid,
    target: String,
    state: SyncActionState,
    sync_point_id: u64,
    path: SyncPath,
    kind: SyncActionKind,
}

impl SyncAction {
    /// Create a queued action with a fresh id.
    ///
    /// # Errors
    /// - Invalid versions, see [`SyncActionKind::path`]
    /// - Empty target or a sync point id of zero
    pub fn new(target: impl Into<String>, sync_point_id: u64, kind: SyncActionKind) -> Result<Self> {
        Self::from_parts(
            Uuid::new_v4(),
            target,
            SyncActionState::Queued,
            sync_point_id,
            kind,
        )
    }

    /// Reassemble a stored action.
    pub fn from_parts(
        id: Uuid,
        target: impl Into<String>,
        state: SyncActionState,
        sync_point_id: u64,
        kind: SyncActionKind,
    ) -> Result<Self> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(Error::InvalidInput("Sync action target cannot be empty".to_string()));
        }
        if sync_point_id == 0 {
            return Err(Error::InvalidInput("Sync point ids start at 1".to_string()));
        }
        let path = kind.path()?;

        Ok(Self {
            id,
            target,
            state,
            sync_point_id,
            path,
            kind,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the history (or group, for conflicts) the action is for.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> SyncActionState {
        self.state
    }

    pub fn sync_point_id(&self) -> u64 {
        self.sync_point_id
    }

    pub fn path(&self) -> &SyncPath {
        &self.path
    }

    pub fn kind(&self) -> &SyncActionKind {
        &self.kind
    }

    pub fn is_conflict(&self) -> bool {
        self.kind.is_conflict()
    }

    /// Whether `other` targets the same history with the same outcome.
    pub fn same_outcome(&self, other: &SyncAction) -> bool {
        self.target.eq_ignore_ascii_case(&other.target) && self.kind.same_outcome(&other.kind)
    }

    /// Move the action to `next`.
    ///
    /// # Errors
    /// - `InvalidTransition` if the state machine forbids the move
    pub fn transition_to(&mut self, next: SyncActionState) -> Result<()> {
        self.state = self.state.transition_to(next)?;
        Ok(())
    }

    /// A copy of the action in state `next`.
    pub fn with_state(&self, next: SyncActionState) -> Result<Self> {
        let mut action = self.clone();
        action.transition_to(next)?;
        Ok(action)
    }

    pub fn activate(&mut self) -> Result<()> {
        self.transition_to(SyncActionState::Active)
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition_to(SyncActionState::Completed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition_to(SyncActionState::Cancelled)
    }

    /// Dispatch to the visitor method for this action's variant.
    pub fn accept<V: SyncActionVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match &self.kind {
            SyncActionKind::Add { new_file } => visitor.visit_add(self, new_file),
            SyncActionKind::Remove { removed_file } => visitor.visit_remove(self, removed_file),
            SyncActionKind::Replace {
                old_version,
                new_version,
            } => visitor.visit_replace(self, old_version, new_version),
            SyncActionKind::MultipleVersionConflict { versions } => {
                visitor.visit_multiple_version_conflict(self, versions)
            }
            SyncActionKind::ModificationDeletionConflict { deleted, modified } => {
                visitor.visit_modification_deletion_conflict(self, deleted, modified)
            }
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {} -> {}",
            self.id,
            self.kind.type_name(),
            self.state,
            self.path,
            self.target
        )
    }
}

/// One method per sync action variant.
pub trait SyncActionVisitor {
    type Output;

    fn visit_add(&mut self, action: &SyncAction, new_file: &FileReference) -> Self::Output;

    fn visit_remove(&mut self, action: &SyncAction, removed_file: &FileReference) -> Self::Output;

    fn visit_replace(
        &mut self,
        action: &SyncAction,
        old_version: &FileReference,
        new_version: &FileReference,
    ) -> Self::Output;

    fn visit_multiple_version_conflict(
        &mut self,
        action: &SyncAction,
        versions: &[FileReference],
    ) -> Self::Output;

    fn visit_modification_deletion_conflict(
        &mut self,
        action: &SyncAction,
        deleted: &FileReference,
        modified: &FileReference,
    ) -> Self::Output;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn version(path: &str, secs: i64) -> FileReference {
        FileReference::new(
            SyncPath::parse(path).unwrap(),
            Some(Utc.timestamp_opt(secs, 0).unwrap()),
            Some(secs as u64),
        )
        .unwrap()
    }

    struct Describe;

    impl SyncActionVisitor for Describe {
        type Output = String;

        fn visit_add(&mut self, _: &SyncAction, new_file: &FileReference) -> String {
            format!("add {}", new_file.path())
        }

        fn visit_remove(&mut self, _: &SyncAction, removed_file: &FileReference) -> String {
            format!("remove {}", removed_file.path())
        }

        fn visit_replace(&mut self, _: &SyncAction, old: &FileReference, _: &FileReference) -> String {
            format!("replace {}", old.path())
        }

        fn visit_multiple_version_conflict(&mut self, _: &SyncAction, v: &[FileReference]) -> String {
            format!("conflict of {}", v.len())
        }

        fn visit_modification_deletion_conflict(
            &mut self,
            _: &SyncAction,
            _: &FileReference,
            modified: &FileReference,
        ) -> String {
            format!("deleted while modified {}", modified.path())
        }
    }

    #[test]
    fn test_new_action_is_queued() {
        let action = SyncAction::new("a", 1, SyncActionKind::Add { new_file: version("/f", 1) }).unwrap();
        assert_eq!(action.state(), SyncActionState::Queued);
        assert_eq!(action.path().to_string(), "/f");
        assert!(!action.is_conflict());
    }

    #[test]
    fn test_rejects_invalid_actions() {
        let kind = SyncActionKind::Replace {
            old_version: version("/a", 1),
            new_version: version("/b", 2),
        };
        assert!(SyncAction::new("a", 1, kind).is_err());

        let single = SyncActionKind::MultipleVersionConflict {
            versions: vec![version("/a", 1)],
        };
        assert!(SyncAction::new("g", 1, single).is_err());

        let add = SyncActionKind::Add { new_file: version("/a", 1) };
        assert!(SyncAction::new("a", 0, add.clone()).is_err());
        assert!(SyncAction::new(" ", 1, add).is_err());
    }

    #[test]
    fn test_lifecycle() {
        let mut action =
            SyncAction::new("a", 1, SyncActionKind::Remove { removed_file: version("/f", 1) }).unwrap();
        action.activate().unwrap();
        action.activate().unwrap();
        action.complete().unwrap();
        assert!(matches!(action.cancel(), Err(Error::InvalidTransition { .. })));
        assert_eq!(action.state(), SyncActionState::Completed);
    }

    #[test]
    fn test_conflict_outcome_ignores_order() {
        let a = SyncAction::new(
            "g",
            1,
            SyncActionKind::MultipleVersionConflict {
                versions: vec![version("/f", 1), version("/f", 2)],
            },
        )
        .unwrap();
        let b = SyncAction::new(
            "G",
            2,
            SyncActionKind::MultipleVersionConflict {
                versions: vec![version("/f", 2), version("/f", 1)],
            },
        )
        .unwrap();
        assert!(a.same_outcome(&b));
        assert!(a.is_conflict());
    }

    #[test]
    fn test_visitor_dispatch() {
        let actions = [
            SyncAction::new("a", 1, SyncActionKind::Add { new_file: version("/x", 1) }).unwrap(),
            SyncAction::new(
                "g",
                1,
                SyncActionKind::ModificationDeletionConflict {
                    deleted: version("/y", 1),
                    modified: version("/y", 2),
                },
            )
            .unwrap(),
        ];
        let described: Vec<String> = actions.iter().map(|a| a.accept(&mut Describe)).collect();
        assert_eq!(described, vec!["add /x", "deleted while modified /y"]);
    }
}
