//! Per-path change graphs.

use std::collections::BTreeMap;
use tracing::debug;

use synctool_common::{FileReference, SyncPath};
use synctool_storage::FileSystemDiff;

use crate::action::SyncAction;
use crate::graph::Graph;

/// A file version, or `None` for "file absent".
pub type Version = Option<FileReference>;

/// The combined history of one path across all histories of a group.
#[derive(Debug, Clone)]
pub struct ChangeGraph {
    pub path: SyncPath,
    pub graph: Graph<Version>,
    /// Each history's version of the path at the end of the window.
    pub heads: BTreeMap<String, Version>,
}

impl ChangeGraph {
    /// Whether every history ended up with the same version.
    pub fn is_converged(&self) -> bool {
        let mut heads = self.heads.values();
        match heads.next() {
            Some(first) => heads.all(|head| head == first),
            None => true,
        }
    }

    /// Record queued work as a move the target history is about to make.
    ///
    /// An ordinary pending action whose target still holds the action's
    /// prior version adds an edge from that version to the one the action
    /// installs, so a history that only lags behind an earlier round is not
    /// mistaken for a diverging one. Heads stay as they are.
    pub fn add_pending(&mut self, actions: &[SyncAction]) {
        for action in actions {
            let Some((from, to)) = action.kind().transition() else {
                continue;
            };
            let holds_prior = self.heads.iter().any(|(history, head)| {
                history.eq_ignore_ascii_case(action.target()) && *head == from
            });
            if holds_prior {
                self.graph.add_edge(from, to);
            }
        }
    }
}

/// Builds change graphs from the diffs of one synchronization window.
pub struct ChangeGraphService;

impl ChangeGraphService {
    /// Build one graph per path that changed in at least one history.
    ///
    /// For a history with changes at the path, the graph gets an edge from
    /// the start node to the first change's prior version followed by one
    /// edge per change. A history without changes contributes an edge from
    /// the start node to its current version. Graphs are returned in path
    /// order.
    pub fn build(diffs: &[FileSystemDiff]) -> Vec<ChangeGraph> {
        let paths: std::collections::BTreeSet<&SyncPath> = diffs
            .iter()
            .flat_map(|diff| diff.change_lists.keys())
            .collect();

        let graphs: Vec<ChangeGraph> = paths
            .into_iter()
            .map(|path| Self::build_for_path(path, diffs))
            .collect();

        debug!("Built {} change graphs from {} histories", graphs.len(), diffs.len());
        graphs
    }

    fn build_for_path(path: &SyncPath, diffs: &[FileSystemDiff]) -> ChangeGraph {
        let mut graph = Graph::new();
        let mut heads = BTreeMap::new();

        for diff in diffs {
            match diff.change_list(path) {
                Some(list) => {
                    graph.add_edge_from_start(list.initial_version().cloned());
                    for change in list.changes() {
                        graph.add_edge(
                            change.from_version().cloned(),
                            change.to_version().cloned(),
                        );
                    }
                    heads.insert(diff.history.clone(), list.final_version().cloned());
                }
                None => {
                    let current = diff.current_state(path);
                    graph.add_edge_from_start(current.clone());
                    heads.insert(diff.history.clone(), current);
                }
            }
        }

        ChangeGraph {
            path: path.clone(),
            graph,
            heads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SyncActionKind;
    use chrono::{TimeZone, Utc};
    use synctool_common::File;
    use synctool_storage::{Directory, PathFilter};

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

    fn diff(history: &str, trees: &[&Directory]) -> FileSystemDiff {
        FileSystemDiff::from_trees(history, None, None, trees, &PathFilter::all()).unwrap()
    }

    #[test]
    fn test_graph_per_changed_path() {
        let base = tree(&[file("/f", 0), file("/g", 0)]);
        let a = diff("a", &[&base, &tree(&[file("/f", 1), file("/g", 0)])]);
        let b = diff("b", &[&base, &base]);

        let graphs = ChangeGraphService::build(&[a, b]);
        assert_eq!(graphs.len(), 1);

        let graph = &graphs[0];
        assert_eq!(graph.path.to_string(), "/f");
        assert!(graph.graph.contains(&Some(file("/f", 0).to_reference())));
        assert!(graph.graph.contains(&Some(file("/f", 1).to_reference())));
        assert_eq!(graph.heads["a"], Some(file("/f", 1).to_reference()));
        assert_eq!(graph.heads["b"], Some(file("/f", 0).to_reference()));
        assert!(!graph.is_converged());
    }

    #[test]
    fn test_absent_file_is_none_node() {
        let empty = Directory::new();
        let a = diff("a", &[&empty, &tree(&[file("/new", 1)])]);
        let b = diff("b", &[&empty, &empty]);

        let graphs = ChangeGraphService::build(&[a, b]);
        let graph = &graphs[0].graph;
        assert!(graph.contains(&None));

        let start_targets: Vec<_> = graph
            .successors(crate::graph::START)
            .iter()
            .map(|&i| graph.node(i).and_then(|n| n.value()).cloned())
            .collect();
        assert_eq!(start_targets, vec![Some(None)]);
    }

    #[test]
    fn test_same_change_converges() {
        let base = tree(&[file("/f", 0)]);
        let changed = tree(&[file("/f", 1)]);
        let a = diff("a", &[&base, &changed]);
        let b = diff("b", &[&base, &changed]);

        let graphs = ChangeGraphService::build(&[a, b]);
        assert!(graphs[0].is_converged());
    }

    #[test]
    fn test_graphs_in_path_order() {
        let empty = Directory::new();
        let a = diff("a", &[&empty, &tree(&[file("/z", 1), file("/B", 1)])]);
        let b = diff("b", &[&empty, &tree(&[file("/a", 1)])]);

        let paths: Vec<String> = ChangeGraphService::build(&[a, b])
            .iter()
            .map(|g| g.path.normalized())
            .collect();
        assert_eq!(paths, vec!["/a", "/b", "/z"]);
    }

    #[test]
    fn test_pending_action_extends_lagging_history() {
        let base = tree(&[file("/f", 0)]);
        let a = diff("a", &[&base, &tree(&[file("/f", 1)])]);
        let b = diff("b", &[&base, &base]);
        let mut graph = ChangeGraphService::build(&[a, b]).remove(0);

        let (f0, f1, f2) = (
            file("/f", 0).to_reference(),
            file("/f", 1).to_reference(),
            file("/f", 2).to_reference(),
        );
        let replace = |target: &str, old: &FileReference, new: &FileReference| {
            SyncAction::new(
                target,
                1,
                SyncActionKind::Replace {
                    old_version: old.clone(),
                    new_version: new.clone(),
                },
            )
            .unwrap()
        };

        // Only b holds the prior version of its action
        graph.add_pending(&[replace("B", &f0, &f2), replace("a", &f0, &f2)]);
        let index = |v: &FileReference| graph.graph.index_of(&Some(v.clone())).unwrap();
        assert!(graph.graph.successors(index(&f0)).contains(&index(&f2)));
        assert!(graph.graph.successors(index(&f1)).is_empty());
        assert_eq!(graph.heads["b"], Some(f0.clone()));

        // Conflicts carry no transition
        let before = graph.graph.len();
        graph.add_pending(&[SyncAction::new(
            "home",
            1,
            SyncActionKind::MultipleVersionConflict {
                versions: vec![f1, f2],
            },
        )
        .unwrap()]);
        assert_eq!(graph.graph.len(), before);
    }
}
