// src/dag/analysis.rs

//! Batch analyses over a [`DependencyGraph`].
//!
//! None of these run implicitly. A topological order (and everything derived
//! from it: critical path, parallel levels) is only meaningful for an acyclic
//! graph, so callers are expected to check
//! [`DependencyGraph::has_circular_dependencies`] first. On a cyclic graph the
//! nodes that sit on, or downstream of, a cycle are left out.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::is_cyclic_directed;

use crate::dag::DependencyGraph;
use crate::engine::TaskId;

/// DFS colouring for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    /// Kahn's algorithm. Nodes become available in insertion order and
    /// dependents are released in edge order, so the result is deterministic.
    pub fn topological_sort(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes()
            .map(|n| (n, self.dependencies_of(n).len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes()
            .filter(|n| in_degree.get(n).copied() == Some(0))
            .collect();

        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());

            for dependent in self.dependents_of(node) {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        order
    }

    /// Every cycle found, each listed in dependency order starting from the
    /// node where the walk entered it.
    ///
    /// A self-dependency is reported as a single-element cycle.
    pub fn detect_circular_dependencies(&self) -> Vec<Vec<TaskId>> {
        let mut marks: HashMap<&str, Mark> =
            self.nodes().map(|n| (n, Mark::Unvisited)).collect();
        let mut cycles = Vec::new();

        for start in self.nodes() {
            if marks.get(start) != Some(&Mark::Unvisited) {
                continue;
            }

            // Iterative DFS following dependency edges. Each frame holds the
            // node and the index of the next dependency to visit.
            let mut path: Vec<&str> = vec![start];
            let mut frames: Vec<(&str, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::OnStack);

            while let Some(frame) = frames.last_mut() {
                let (node, next) = *frame;
                let deps = self.dependencies_of(node);

                if next >= deps.len() {
                    marks.insert(node, Mark::Done);
                    frames.pop();
                    path.pop();
                    continue;
                }

                frame.1 += 1;
                let dep = deps[next];

                match marks.get(dep).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Unvisited => {
                        marks.insert(dep, Mark::OnStack);
                        path.push(dep);
                        frames.push((dep, 0));
                    }
                    Mark::OnStack => {
                        if let Some(pos) = path.iter().position(|&p| p == dep) {
                            cycles.push(path[pos..].iter().map(|s| s.to_string()).collect());
                        }
                    }
                    Mark::Done => {}
                }
            }
        }

        cycles
    }

    pub fn has_circular_dependencies(&self) -> bool {
        is_cyclic_directed(self.inner())
    }

    /// Longest dependency chain by edge count, listed dependency first.
    pub fn critical_path(&self) -> Vec<TaskId> {
        let order = self.topological_sort();
        if order.is_empty() {
            return Vec::new();
        }

        let mut length: HashMap<&str, usize> = HashMap::new();
        let mut prev: HashMap<&str, &str> = HashMap::new();

        for node in &order {
            let mut best = 0;
            for dep in self.dependencies_of(node) {
                if let Some(&len) = length.get(dep) {
                    if len + 1 > best {
                        best = len + 1;
                        prev.insert(node.as_str(), dep);
                    }
                }
            }
            length.insert(node.as_str(), best);
        }

        let mut end = order[0].as_str();
        for node in &order {
            if length[node.as_str()] > length[end] {
                end = node.as_str();
            }
        }

        let mut path = vec![end.to_string()];
        let mut cursor = end;
        while let Some(&p) = prev.get(cursor) {
            path.push(p.to_string());
            cursor = p;
        }
        path.reverse();
        path
    }

    /// Partition nodes into levels that can run concurrently.
    ///
    /// Level 0 holds nodes without dependencies; level `k` holds nodes whose
    /// dependencies all sit in levels `< k`. Within a level, nodes keep their
    /// insertion order.
    pub fn parallel_levels(&self) -> Vec<Vec<TaskId>> {
        let order = self.topological_sort();
        let mut level_of: HashMap<&str, usize> = HashMap::new();

        for node in &order {
            let level = self
                .dependencies_of(node)
                .iter()
                .filter_map(|dep| level_of.get(dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(node.as_str(), level);
        }

        let depth = level_of.values().copied().max().map_or(0, |m| m + 1);
        let mut levels: Vec<Vec<TaskId>> = vec![Vec::new(); depth];

        let sorted: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        for node in self.nodes().filter(|n| sorted.contains(n)) {
            if let Some(&level) = level_of.get(node) {
                levels[level].push(node.to_string());
            }
        }

        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DependencyGraph {
        DependencyGraph::from_edges([
            ("A", vec![]),
            ("B", vec![]),
            ("C", vec!["A"]),
            ("D", vec!["B"]),
            ("E", vec!["C", "D"]),
        ])
    }

    fn position(order: &[TaskId], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn topological_sort_respects_edges() {
        let g = diamond();
        let order = g.topological_sort();

        assert_eq!(order.len(), 5);
        for node in g.nodes() {
            for dep in g.dependencies_of(node) {
                assert!(position(&order, dep) < position(&order, node));
            }
        }
    }

    #[test]
    fn topological_sort_breaks_ties_by_insertion_order() {
        let g = diamond();
        assert_eq!(g.topological_sort(), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn diamond_parallel_levels() {
        let levels = diamond().parallel_levels();
        assert_eq!(
            levels,
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["C".to_string(), "D".to_string()],
                vec!["E".to_string()],
            ]
        );
    }

    #[test]
    fn isolated_nodes_are_level_zero() {
        let mut g = DependencyGraph::new();
        g.add_node("solo");
        g.add_dependency("B", "A");

        let levels = g.parallel_levels();
        assert_eq!(levels[0], vec!["solo".to_string(), "A".to_string()]);
        assert_eq!(levels[1], vec!["B".to_string()]);
    }

    #[test]
    fn empty_graph_gives_empty_results() {
        let g = DependencyGraph::new();
        assert!(g.topological_sort().is_empty());
        assert!(g.parallel_levels().is_empty());
        assert!(g.critical_path().is_empty());
        assert!(g.detect_circular_dependencies().is_empty());
        assert!(!g.has_circular_dependencies());
    }

    #[test]
    fn critical_path_is_longest_chain() {
        let g = DependencyGraph::from_edges([
            ("A", vec![]),
            ("B", vec!["A"]),
            ("C", vec!["B"]),
            ("X", vec![]),
            ("Y", vec!["X"]),
        ]);
        assert_eq!(g.critical_path(), vec!["A", "B", "C"]);
    }

    #[test]
    fn detects_two_node_cycle() {
        let mut g = DependencyGraph::new();
        g.add_dependency("A", "B");
        g.add_dependency("B", "A");

        let cycles = g.detect_circular_dependencies();
        assert_eq!(cycles, vec![vec!["A".to_string(), "B".to_string()]]);
        assert!(g.has_circular_dependencies());
    }

    #[test]
    fn detects_self_dependency() {
        let mut g = DependencyGraph::new();
        g.add_dependency("A", "A");

        assert_eq!(g.detect_circular_dependencies(), vec![vec!["A".to_string()]]);
        assert!(g.has_circular_dependencies());
    }

    #[test]
    fn cycle_members_are_left_out_of_topological_order() {
        let mut g = DependencyGraph::new();
        g.add_node("root");
        g.add_dependency("A", "B");
        g.add_dependency("B", "A");
        g.add_dependency("C", "A");

        assert_eq!(g.topological_sort(), vec!["root"]);
    }
}
