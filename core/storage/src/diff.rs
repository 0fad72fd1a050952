//! Differences between snapshots of a history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use synctool_common::{Change, ChangeList, FileReference, Result, SnapshotId, SyncPath};

use crate::tree::Directory;

/// Selects the paths that take part in synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFilter {
    /// Paths excluded together with everything below them.
    #[serde(default)]
    pub excluded: Vec<SyncPath>,
}

impl PathFilter {
    /// A filter that includes every path.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn excluding(excluded: Vec<SyncPath>) -> Self {
        Self { excluded }
    }

    pub fn includes(&self, path: &SyncPath) -> bool {
        !self.excluded.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// The changes of one history between two snapshots.
#[derive(Debug, Clone)]
pub struct FileSystemDiff {
    /// Name of the history the diff belongs to.
    pub history: String,
    /// Lower bound; `None` means the empty origin.
    pub from_snapshot: Option<SnapshotId>,
    /// Upper bound; `None` if the history has no snapshots yet.
    pub to_snapshot: Option<SnapshotId>,
    /// The history's tree at the upper bound.
    pub to_tree: Directory,
    /// Changes keyed by path.
    pub change_lists: BTreeMap<SyncPath, ChangeList>,
}

impl FileSystemDiff {
    /// A diff of a history that has nothing to compare.
    pub fn empty(history: impl Into<String>, snapshot: Option<SnapshotId>, tree: Directory) -> Self {
        Self {
            history: history.into(),
            from_snapshot: snapshot.clone(),
            to_snapshot: snapshot,
            to_tree: tree,
            change_lists: BTreeMap::new(),
        }
    }

    /// Build the diff across a sequence of trees.
    ///
    /// `trees[0]` is the lower bound; every later tree yields at most one
    /// change per path, so each change list follows the sequence in order.
    pub fn from_trees(
        history: impl Into<String>,
        from_snapshot: Option<SnapshotId>,
        to_snapshot: Option<SnapshotId>,
        trees: &[&Directory],
        filter: &PathFilter,
    ) -> Result<Self> {
        let mut changes: BTreeMap<SyncPath, Vec<Change>> = BTreeMap::new();
        for pair in trees.windows(2) {
            for change in changes_between(pair[0], pair[1], filter)? {
                changes.entry(change.path().clone()).or_default().push(change);
            }
        }

        let change_lists = changes
            .into_iter()
            .map(|(path, list)| Ok((path, ChangeList::new(list)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            history: history.into(),
            from_snapshot,
            to_snapshot,
            to_tree: trees.last().map(|t| (*t).clone()).unwrap_or_default(),
            change_lists,
        })
    }

    /// The change list for a path, if the path changed.
    pub fn change_list(&self, path: &SyncPath) -> Option<&ChangeList> {
        self.change_lists.get(path)
    }

    /// The history's version of a path at the upper bound.
    pub fn current_state(&self, path: &SyncPath) -> Option<FileReference> {
        self.to_tree.file(path).map(|f| f.to_reference())
    }

    pub fn is_empty(&self) -> bool {
        self.change_lists.is_empty()
    }
}

/// Diffs of several histories over the same synchronization window.
#[derive(Debug, Clone, Default)]
pub struct MultiFileSystemDiff {
    diffs: Vec<FileSystemDiff>,
}

impl MultiFileSystemDiff {
    pub fn new(diffs: Vec<FileSystemDiff>) -> Self {
        Self { diffs }
    }

    pub fn diffs(&self) -> &[FileSystemDiff] {
        &self.diffs
    }

    pub fn get(&self, history: &str) -> Option<&FileSystemDiff> {
        self.diffs.iter().find(|d| d.history == history)
    }

    /// Every path that changed in at least one history, in order.
    pub fn changed_paths(&self) -> BTreeSet<SyncPath> {
        self.diffs
            .iter()
            .flat_map(|d| d.change_lists.keys().cloned())
            .collect()
    }
}

/// Compute the changes that turn `before` into `after`, in path order.
pub fn changes_between(
    before: &Directory,
    after: &Directory,
    filter: &PathFilter,
) -> Result<Vec<Change>> {
    let old: BTreeMap<SyncPath, FileReference> = before
        .files()
        .into_iter()
        .filter(|f| filter.includes(&f.path))
        .map(|f| (f.path.clone(), f.to_reference()))
        .collect();
    let new: BTreeMap<SyncPath, FileReference> = after
        .files()
        .into_iter()
        .filter(|f| filter.includes(&f.path))
        .map(|f| (f.path.clone(), f.to_reference()))
        .collect();

    let paths: BTreeSet<&SyncPath> = old.keys().chain(new.keys()).collect();
    let mut changes = Vec::new();
    for path in paths {
        match (old.get(path), new.get(path)) {
            (None, Some(to)) => changes.push(Change::added(to.clone())),
            (Some(from), None) => changes.push(Change::deleted(from.clone())),
            (Some(from), Some(to)) if from != to => {
                changes.push(Change::modified(from.clone(), to.clone())?);
            }
            _ => {}
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use synctool_common::{ChangeType, File};

    fn file(path: &str, secs: i64) -> File {
        File::new(
            SyncPath::parse(path).unwrap(),
            Utc.timestamp_opt(secs, 0).unwrap(),
            secs as u64,
        )
    }

    fn tree(files: &[File]) -> Directory {
        let mut tree = Directory::new();
        for f in files {
            tree.add_file(f).unwrap();
        }
        tree
    }

    #[test]
    fn test_changes_between_trees() {
        let before = tree(&[file("/keep", 1), file("/modify", 1), file("/delete", 1)]);
        let after = tree(&[file("/keep", 1), file("/MODIFY", 2), file("/add", 1)]);

        let changes = changes_between(&before, &after, &PathFilter::all()).unwrap();
        let kinds: Vec<(String, ChangeType)> = changes
            .iter()
            .map(|c| (c.path().normalized(), c.change_type()))
            .collect();

        assert_eq!(
            kinds,
            vec![
                ("/add".to_string(), ChangeType::Added),
                ("/delete".to_string(), ChangeType::Deleted),
                ("/modify".to_string(), ChangeType::Modified),
            ]
        );
    }

    #[test]
    fn test_filter_excludes_subtree() {
        let filter = PathFilter::excluding(vec![SyncPath::parse("/Tmp").unwrap()]);
        assert!(!filter.includes(&SyncPath::parse("/tmp/x").unwrap()));
        assert!(filter.includes(&SyncPath::parse("/tmpx").unwrap()));

        let changes = changes_between(
            &Directory::new(),
            &tree(&[file("/tmp/a", 1), file("/b", 1)]),
            &filter,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_diff_over_several_trees_builds_chains() {
        let t0 = Directory::new();
        let t1 = tree(&[file("/x", 1)]);
        let t2 = tree(&[file("/x", 2), file("/y", 1)]);
        let t3 = tree(&[file("/y", 1)]);

        let diff = FileSystemDiff::from_trees(
            "a",
            None,
            Some(SnapshotId::new("s3").unwrap()),
            &[&t0, &t1, &t2, &t3],
            &PathFilter::all(),
        )
        .unwrap();

        let x = diff.change_list(&SyncPath::parse("/x").unwrap()).unwrap();
        let types: Vec<ChangeType> = x.changes().iter().map(|c| c.change_type()).collect();
        assert_eq!(types, vec![ChangeType::Added, ChangeType::Modified, ChangeType::Deleted]);

        assert_eq!(diff.current_state(&SyncPath::parse("/x").unwrap()), None);
        assert_eq!(
            diff.current_state(&SyncPath::parse("/y").unwrap()),
            Some(file("/y", 1).to_reference())
        );
    }

    #[test]
    fn test_multi_diff_changed_paths() {
        let a = FileSystemDiff::from_trees(
            "a",
            None,
            None,
            &[&Directory::new(), &tree(&[file("/p", 1)])],
            &PathFilter::all(),
        )
        .unwrap();
        let b = FileSystemDiff::from_trees(
            "b",
            None,
            None,
            &[&Directory::new(), &tree(&[file("/P", 2), file("/q", 1)])],
            &PathFilter::all(),
        )
        .unwrap();

        let multi = MultiFileSystemDiff::new(vec![a, b]);
        assert_eq!(multi.changed_paths().len(), 2);
        assert!(multi.get("b").is_some());
        assert!(multi.get("c").is_none());
    }
}
