// tests/dag_properties.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use taskorch::dag::{DependencyGraph, ReadinessCalculator};

/// Random acyclic graph: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = DependencyGraph> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut graph = DependencyGraph::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let id = format!("task_{i}");
                graph.add_node(&id);
                if i == 0 {
                    continue;
                }
                let deps: HashSet<usize> = potential.into_iter().map(|d| d % i).collect();
                for dep in deps {
                    graph.add_dependency(&id, &format!("task_{dep}"));
                }
            }
            graph
        })
    })
}

proptest! {
    #[test]
    fn topological_order_respects_every_edge(graph in dag_strategy(12)) {
        let order = graph.topological_sort();
        prop_assert_eq!(order.len(), graph.len());

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        for id in graph.nodes() {
            for dep in graph.dependencies_of(id) {
                prop_assert!(position[dep] < position[id], "{} must precede {}", dep, id);
            }
        }
        prop_assert!(!graph.has_circular_dependencies());
    }

    #[test]
    fn parallel_levels_partition_the_graph(graph in dag_strategy(12)) {
        let levels = graph.parallel_levels();
        let flattened: Vec<&String> = levels.iter().flatten().collect();
        prop_assert_eq!(flattened.len(), graph.len());

        let level_of: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .flat_map(|(depth, level)| level.iter().map(move |id| (id.as_str(), depth)))
            .collect();
        for id in graph.nodes() {
            for dep in graph.dependencies_of(id) {
                prop_assert!(level_of[dep] < level_of[id]);
            }
        }
        prop_assert_eq!(graph.critical_path().len(), levels.len());
    }

    #[test]
    fn adding_an_existing_dependency_changes_nothing(graph in dag_strategy(8)) {
        let mut again = graph.clone();
        let edges: Vec<(String, String)> = graph
            .nodes()
            .flat_map(|id| {
                graph
                    .dependencies_of(id)
                    .into_iter()
                    .map(move |dep| (id.to_string(), dep.to_string()))
            })
            .collect();
        for (id, dep) in &edges {
            again.add_dependency(id, dep);
        }
        prop_assert_eq!(again.edge_count(), graph.edge_count());
        prop_assert_eq!(again.topological_sort(), graph.topological_sort());
    }

    #[test]
    fn incremental_readiness_matches_full_recompute(
        graph in dag_strategy(10),
        outcomes in proptest::collection::vec(any::<bool>(), 10),
    ) {
        let mut incremental = ReadinessCalculator::new(graph.clone());
        incremental.recompute_all();

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        // Settle tasks in topological order; a task only settles once ready.
        for (i, id) in graph.topological_sort().into_iter().enumerate() {
            if !incremental.readiness(&id).is_some_and(|r| r.is_ready()) {
                continue;
            }
            incremental.on_task_started(&id);
            if outcomes[i % outcomes.len()] {
                incremental.on_task_completed(&id);
                completed.push(id);
            } else {
                incremental.on_task_failed(&id);
                failed.push(id);
            }
        }

        let mut full = ReadinessCalculator::new(graph.clone());
        full.initialize_from_state(completed, failed, Vec::new());

        for id in graph.nodes() {
            let lhs = incremental.readiness(id).map(|r| r.state);
            let rhs = full.readiness(id).map(|r| r.state);
            prop_assert_eq!(lhs, rhs, "readiness differs for {}", id);
        }
    }
}
