// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::engine::TaskId;

/// Directed dependency graph keyed by task ID.
///
/// Edges point from a dependency to its dependent, so for "B depends on A"
/// we store `A -> B`. Both directions are available through petgraph's
/// incoming/outgoing adjacency.
///
/// Construction is permissive:
/// - edges referencing unseen IDs create the missing nodes
/// - re-adding an existing edge is a no-op
/// - cycle-creating edges are accepted; use
///   [`DependencyGraph::detect_circular_dependencies`] to validate
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(task, deps)` pairs, in iteration order.
    pub fn from_edges<'a, I, D>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut graph = Self::new();
        for (task, deps) in tasks {
            graph.add_node(task);
            for dep in deps {
                graph.add_dependency(task, dep);
            }
        }
        graph
    }

    /// Add a node if it is not already present.
    pub fn add_node(&mut self, id: &str) {
        self.ensure_node(id);
    }

    /// Record that `dependent` depends on `dependency`.
    ///
    /// Missing nodes are created. Adding the same edge twice leaves the graph
    /// unchanged.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let to = self.ensure_node(dependent);
        let from = self.ensure_node(dependency);

        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All task IDs, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task, in the order the edges were added.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Immediate dependents of a task, in the order the edges were added.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].as_str())
            .collect()
    }

    pub(crate) fn inner(&self) -> &DiGraph<TaskId, ()> {
        &self.graph
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    fn neighbors(&self, id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };

        // petgraph yields the most recently added edge first.
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_dependency_creates_missing_nodes() {
        let mut g = DependencyGraph::new();
        g.add_dependency("B", "A");

        assert!(g.contains("A"));
        assert!(g.contains("B"));
        assert_eq!(g.dependencies_of("B"), vec!["A"]);
        assert_eq!(g.dependents_of("A"), vec!["B"]);
    }

    #[test]
    fn add_dependency_is_idempotent() {
        let mut once = DependencyGraph::new();
        once.add_dependency("B", "A");

        let mut twice = DependencyGraph::new();
        twice.add_dependency("B", "A");
        twice.add_dependency("B", "A");

        assert_eq!(once.edge_count(), twice.edge_count());
        assert_eq!(twice.dependencies_of("B"), vec!["A"]);
        assert_eq!(twice.dependents_of("A"), vec!["B"]);
    }

    #[test]
    fn neighbours_keep_insertion_order() {
        let mut g = DependencyGraph::new();
        g.add_dependency("D", "A");
        g.add_dependency("D", "C");
        g.add_dependency("D", "B");

        assert_eq!(g.dependencies_of("D"), vec!["A", "C", "B"]);
        assert_eq!(g.nodes().collect::<Vec<_>>(), vec!["D", "A", "C", "B"]);
    }

    #[test]
    fn unknown_ids_return_empty() {
        let g = DependencyGraph::new();
        assert!(g.dependencies_of("nope").is_empty());
        assert!(g.dependents_of("nope").is_empty());
        assert!(g.is_empty());
    }

    #[test]
    fn cycle_edges_are_accepted() {
        let mut g = DependencyGraph::new();
        g.add_dependency("A", "B");
        g.add_dependency("B", "A");
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn roots_are_nodes_without_dependencies() {
        let g = DependencyGraph::from_edges([("A", vec![]), ("B", vec!["A"]), ("C", vec![])]);
        assert_eq!(g.roots(), vec!["A", "C"]);
    }
}
