//! Directed graphs over file versions.
//!
//! Nodes live in an arena and are addressed by `NodeIndex`; index `0` is
//! always the synthetic start node. A `Graph` identifies value nodes by
//! equality, so it may contain cycles when a history returns to an earlier
//! version. `AcyclicGraph` unrolls such cycles by duplicating nodes.

use std::collections::HashMap;
use std::hash::Hash;

/// Position of a node in a graph's arena.
pub type NodeIndex = usize;

/// Index of the start node in every graph.
pub const START: NodeIndex = 0;

/// A graph node: the synthetic start or a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<T> {
    Start,
    Value(T),
}

impl<T> Node<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Node::Start => None,
            Node::Value(value) => Some(value),
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Node::Start)
    }
}

#[derive(Debug, Clone)]
struct NodeData<T> {
    node: Node<T>,
    successors: Vec<NodeIndex>,
}

impl<T> NodeData<T> {
    fn new(node: Node<T>) -> Self {
        Self {
            node,
            successors: Vec::new(),
        }
    }

    fn link(&mut self, to: NodeIndex) {
        if !self.successors.contains(&to) {
            self.successors.push(to);
        }
    }
}

fn predecessors_in<T>(nodes: &[NodeData<T>], index: NodeIndex) -> Vec<NodeIndex> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, data)| data.successors.contains(&index))
        .map(|(i, _)| i)
        .collect()
}

fn sinks_in<T>(nodes: &[NodeData<T>]) -> Vec<NodeIndex> {
    nodes
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, data)| data.successors.is_empty())
        .map(|(i, _)| i)
        .collect()
}

/// A graph with one node per distinct value.
#[derive(Debug, Clone)]
pub struct Graph<T> {
    nodes: Vec<NodeData<T>>,
    index: HashMap<T, NodeIndex>,
}

impl<T: Clone + Eq + Hash> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> Graph<T> {
    /// Create a graph containing only the start node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::new(Node::Start)],
            index: HashMap::new(),
        }
    }

    /// Add a node for `value` unless one exists, and return its index.
    pub fn add_node(&mut self, value: T) -> NodeIndex {
        if let Some(&existing) = self.index.get(&value) {
            return existing;
        }
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(Node::Value(value.clone())));
        self.index.insert(value, index);
        index
    }

    /// Add an edge between two values, adding their nodes as needed.
    pub fn add_edge(&mut self, from: T, to: T) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        self.nodes[from].link(to);
    }

    pub fn add_edge_from_start(&mut self, to: T) {
        let to = self.add_node(to);
        self.nodes[START].link(to);
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index.contains_key(value)
    }

    pub fn index_of(&self, value: &T) -> Option<NodeIndex> {
        self.index.get(value).copied()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node<T>> {
        self.nodes.get(index).map(|data| &data.node)
    }

    pub fn successors(&self, index: NodeIndex) -> &[NodeIndex] {
        self.nodes
            .get(index)
            .map(|data| data.successors.as_slice())
            .unwrap_or(&[])
    }

    /// Values of all nodes except the start node, in insertion order.
    pub fn value_nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().filter_map(|data| data.node.value())
    }

    /// Value nodes without successors.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        sinks_in(&self.nodes)
    }

    /// Number of nodes including the start node.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Unroll the graph into an acyclic one.
    ///
    /// Nodes are numbered depth-first from the start node; nodes that cannot
    /// be reached are numbered afterwards. Every edge is then replayed, and
    /// an edge whose target is not numbered higher than its source points to
    /// a fresh copy of the target instead.
    pub fn to_acyclic(&self) -> AcyclicGraph<T> {
        let order = self.preorder();

        let mut acyclic = AcyclicGraph {
            nodes: Vec::with_capacity(self.nodes.len()),
            index: HashMap::new(),
        };
        let mut numbered = vec![START; self.nodes.len()];
        for (position, &original) in order.iter().enumerate() {
            numbered[original] = position;
            acyclic.push(self.nodes[original].node.clone());
        }

        for &original in &order {
            let start = numbered[original];
            for &successor in &self.nodes[original].successors {
                let mut end = numbered[successor];
                if end <= start {
                    end = acyclic.push(self.nodes[successor].node.clone());
                }
                acyclic.nodes[start].link(end);
            }
        }

        acyclic
    }

    fn preorder(&self) -> Vec<NodeIndex> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        let roots = std::iter::once(START).chain(1..self.nodes.len());
        for root in roots {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            order.push(root);

            // (node, position of the next successor to look at)
            let mut stack = vec![(root, 0usize)];
            while let Some((node, next)) = stack.pop() {
                let successors = &self.nodes[node].successors;
                if next >= successors.len() {
                    continue;
                }
                stack.push((node, next + 1));

                let successor = successors[next];
                if !visited[successor] {
                    visited[successor] = true;
                    order.push(successor);
                    stack.push((successor, 0));
                }
            }
        }

        order
    }
}

/// A graph in which every edge points to a higher index.
///
/// A value may be held by several nodes.
#[derive(Debug, Clone)]
pub struct AcyclicGraph<T> {
    nodes: Vec<NodeData<T>>,
    index: HashMap<T, Vec<NodeIndex>>,
}

impl<T: Clone + Eq + Hash> AcyclicGraph<T> {
    fn push(&mut self, node: Node<T>) -> NodeIndex {
        let index = self.nodes.len();
        if let Node::Value(value) = &node {
            self.index.entry(value.clone()).or_default().push(index);
        }
        self.nodes.push(NodeData::new(node));
        index
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node<T>> {
        self.nodes.get(index).map(|data| &data.node)
    }

    pub fn value(&self, index: NodeIndex) -> Option<&T> {
        self.node(index).and_then(Node::value)
    }

    pub fn successors(&self, index: NodeIndex) -> &[NodeIndex] {
        self.nodes
            .get(index)
            .map(|data| data.successors.as_slice())
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        predecessors_in(&self.nodes, index)
    }

    /// All nodes holding `value`, in index order.
    pub fn nodes_for(&self, value: &T) -> &[NodeIndex] {
        self.index.get(value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index.contains_key(value)
    }

    /// Value nodes without successors.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        sinks_in(&self.nodes)
    }

    /// Every edge as `(source, target)`.
    pub fn edges(&self) -> Vec<(NodeIndex, NodeIndex)> {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(i, data)| data.successors.iter().map(move |&s| (i, s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nodes_are_identified_by_value() {
        let mut graph = Graph::new();
        graph.add_edge_from_start("a");
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");

        assert_eq!(graph.len(), 3);
        assert!(graph.contains(&"b"));
        assert!(!graph.contains(&"c"));
        assert_eq!(graph.successors(graph.index_of(&"a").unwrap()).len(), 1);
        assert_eq!(graph.value_nodes().copied().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_none_is_an_ordinary_value() {
        let mut graph: Graph<Option<&str>> = Graph::new();
        graph.add_edge_from_start(Some("a"));
        graph.add_edge(Some("a"), None);

        assert!(graph.contains(&None));
        let sinks = graph.sinks();
        assert_eq!(sinks.len(), 1);
        assert_eq!(graph.node(sinks[0]), Some(&Node::Value(None)));
    }

    #[test]
    fn test_cycle_is_unrolled() {
        // A -> B -> A
        let mut graph = Graph::new();
        graph.add_edge_from_start("a");
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        assert!(graph.sinks().is_empty());

        let acyclic = graph.to_acyclic();
        for (source, target) in acyclic.edges() {
            assert!(target > source);
        }
        assert_eq!(acyclic.nodes_for(&"a").len(), 2);

        let sinks = acyclic.sinks();
        assert_eq!(sinks.len(), 1);
        assert_eq!(acyclic.value(sinks[0]), Some(&"a"));
        assert_eq!(acyclic.predecessors(sinks[0]), acyclic.nodes_for(&"b").to_vec());
    }

    #[test]
    fn test_depth_first_numbering() {
        let mut graph = Graph::new();
        graph.add_edge_from_start("a");
        graph.add_edge_from_start("c");
        graph.add_edge("a", "b");

        let acyclic = graph.to_acyclic();
        assert_eq!(acyclic.value(1), Some(&"a"));
        assert_eq!(acyclic.value(2), Some(&"b"));
        assert_eq!(acyclic.value(3), Some(&"c"));
        assert_eq!(acyclic.len(), 4);
    }

    #[test]
    fn test_unreachable_nodes_are_kept() {
        let mut graph = Graph::new();
        graph.add_node("lonely");
        graph.add_edge_from_start("a");

        let acyclic = graph.to_acyclic();
        assert!(acyclic.contains(&"lonely"));
        assert_eq!(acyclic.sinks().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_acyclic_edges_increase(
            edges in prop::collection::vec((0u8..6, 0u8..6), 0..24),
            roots in prop::collection::vec(0u8..6, 1..3),
        ) {
            let mut graph = Graph::new();
            for root in &roots {
                graph.add_edge_from_start(*root);
            }
            for (from, to) in &edges {
                graph.add_edge(*from, *to);
            }

            let acyclic = graph.to_acyclic();
            for (source, target) in acyclic.edges() {
                prop_assert!(target > source);
            }
            // Every original value survives the unrolling
            for value in graph.value_nodes() {
                prop_assert!(acyclic.contains(value));
            }
            // Original edges are preserved between some pair of copies
            for (from, to) in &edges {
                let preserved = acyclic.nodes_for(from).iter().any(|&f| {
                    acyclic
                        .successors(f)
                        .iter()
                        .any(|&t| acyclic.value(t) == Some(to))
                });
                prop_assert!(preserved);
            }
        }
    }
}
