// src/dag/readiness.rs

//! Readiness tracking on top of the dependency graph.
//!
//! The calculator keeps three sets (completed, failed, running) and derives
//! a [`TaskReadiness`] record per task from them. Records are cached, but the
//! cache is never authoritative: [`ReadinessCalculator::recompute_all`] rebuilds
//! every record from the sets and must agree with the incremental updates
//! performed by [`ReadinessCalculator::on_task_completed`] and
//! [`ReadinessCalculator::on_task_failed`].

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::dag::DependencyGraph;
use crate::dag::task_info::{BlockingSource, ReadinessState, TaskReadiness};
use crate::engine::TaskId;

pub struct ReadinessCalculator {
    graph: DependencyGraph,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
    running: HashSet<TaskId>,
    records: HashMap<TaskId, TaskReadiness>,
    blocking: Option<Arc<dyn BlockingSource>>,
}

impl fmt::Debug for ReadinessCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessCalculator")
            .field("graph", &self.graph)
            .field("completed", &self.completed.len())
            .field("failed", &self.failed.len())
            .field("running", &self.running.len())
            .finish_non_exhaustive()
    }
}

impl ReadinessCalculator {
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            graph,
            completed: HashSet::new(),
            failed: HashSet::new(),
            running: HashSet::new(),
            records: HashMap::new(),
            blocking: None,
        }
    }

    /// Consult `source` to treat externally blocked dependencies as unmet.
    pub fn with_blocking_source(mut self, source: Arc<dyn BlockingSource>) -> Self {
        self.blocking = Some(source);
        self.records.clear();
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Mutable access to the graph. Cached records are dropped since new
    /// edges can change any task's readiness.
    pub fn graph_mut(&mut self) -> &mut DependencyGraph {
        self.records.clear();
        &mut self.graph
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.contains(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.contains(id)
    }

    /// Seed the calculator from durable state and rebuild every record.
    pub fn initialize_from_state<I, J, K>(&mut self, completed: I, failed: J, running: K)
    where
        I: IntoIterator<Item = TaskId>,
        J: IntoIterator<Item = TaskId>,
        K: IntoIterator<Item = TaskId>,
    {
        self.completed = completed.into_iter().collect();
        self.failed = failed.into_iter().collect();
        self.running = running.into_iter().collect();
        self.recompute_all();

        debug!(
            completed = self.completed.len(),
            failed = self.failed.len(),
            running = self.running.len(),
            "readiness initialised from persisted state"
        );
    }

    /// Forget all progress for the current session.
    pub fn reset(&mut self) {
        self.completed.clear();
        self.failed.clear();
        self.running.clear();
        self.records.clear();
    }

    /// Compute (and cache) the readiness record for `id`.
    ///
    /// Returns `None` for unknown tasks.
    pub fn calculate_readiness(&mut self, id: &str) -> Option<TaskReadiness> {
        let record = self.compute(id)?;
        self.records.insert(id.to_string(), record.clone());
        Some(record)
    }

    /// Cached record for `id`, computed on the fly when missing.
    pub fn readiness(&self, id: &str) -> Option<TaskReadiness> {
        match self.records.get(id) {
            Some(record) => Some(record.clone()),
            None => self.compute(id),
        }
    }

    pub fn on_task_started(&mut self, id: &str) {
        if !self.graph.contains(id) {
            warn!(task = %id, "start reported for unknown task; ignoring");
            return;
        }
        self.running.insert(id.to_string());
        self.refresh(id);
    }

    /// Mark `id` completed and recompute its direct dependents only.
    ///
    /// Returns the dependents that became ready as a result.
    pub fn on_task_completed(&mut self, id: &str) -> Vec<TaskId> {
        if !self.graph.contains(id) {
            warn!(task = %id, "completion reported for unknown task; ignoring");
            return Vec::new();
        }

        self.running.remove(id);
        self.failed.remove(id);
        self.completed.insert(id.to_string());
        self.refresh(id);

        let mut newly_ready = Vec::new();
        for dependent in self.dependents_owned(id) {
            let was_ready = self
                .records
                .get(&dependent)
                .is_some_and(TaskReadiness::is_ready);

            if self.refresh(&dependent) == Some(ReadinessState::Ready) && !was_ready {
                newly_ready.push(dependent);
            }
        }

        debug!(task = %id, ?newly_ready, "task completed; dependents recomputed");
        newly_ready
    }

    /// Mark `id` failed and immediately block its direct dependents.
    ///
    /// Dependents that are already completed, failed or running keep that
    /// state (it takes precedence over `Blocked`). Returns the dependents that
    /// are now blocked.
    pub fn on_task_failed(&mut self, id: &str) -> Vec<TaskId> {
        if !self.graph.contains(id) {
            warn!(task = %id, "failure reported for unknown task; ignoring");
            return Vec::new();
        }

        self.running.remove(id);
        self.completed.remove(id);
        self.failed.insert(id.to_string());
        self.refresh(id);

        let mut blocked = Vec::new();
        for dependent in self.dependents_owned(id) {
            if self.refresh(&dependent) == Some(ReadinessState::Blocked) {
                blocked.push(dependent);
            }
        }

        debug!(task = %id, ?blocked, "task failed; direct dependents blocked");
        blocked
    }

    /// Clear an earlier failure so the task can be attempted again.
    ///
    /// Direct dependents are recomputed: they leave `Blocked` unless another
    /// dependency still blocks them. Returns `false` if the task had not
    /// failed.
    pub fn on_task_retried(&mut self, id: &str) -> bool {
        if !self.failed.remove(id) {
            return false;
        }
        self.refresh(id);
        for dependent in self.dependents_owned(id) {
            self.refresh(&dependent);
        }
        debug!(task = %id, "failed task cleared for retry");
        true
    }

    /// Drop `id` from the running set without recording an outcome.
    pub fn on_task_stopped(&mut self, id: &str) {
        if self.running.remove(id) {
            self.refresh(id);
        }
    }

    /// Rebuild every cached record from the current sets.
    pub fn recompute_all(&mut self) {
        let ids: Vec<TaskId> = self.graph.nodes().map(str::to_string).collect();
        self.records.clear();
        for id in ids {
            self.refresh(&id);
        }
    }

    /// Full recompute, then every ready task in graph insertion order.
    pub fn ready_tasks(&mut self) -> Vec<TaskId> {
        self.recompute_all();
        self.graph
            .nodes()
            .filter(|id| self.records.get(*id).is_some_and(TaskReadiness::is_ready))
            .map(str::to_string)
            .collect()
    }

    /// Like [`Self::ready_tasks`], ordered by `cmp` (stable).
    pub fn ready_tasks_by<F>(&mut self, mut cmp: F) -> Vec<TaskId>
    where
        F: FnMut(&TaskId, &TaskId) -> Ordering,
    {
        let mut ready = self.ready_tasks();
        ready.sort_by(|a, b| cmp(a, b));
        ready
    }

    /// The longest chain of unfinished dependencies standing in front of
    /// `id`, root first and excluding `id` itself.
    ///
    /// Intended for display and ETA estimation, not scheduling.
    pub fn critical_path_to(&self, id: &str) -> Vec<TaskId> {
        if !self.graph.contains(id) {
            return Vec::new();
        }
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        self.unmet_chain(id, &mut memo, &mut visiting)
    }

    pub fn estimate_ready_time(&self, id: &str, avg_duration: Duration) -> Option<DateTime<Utc>> {
        self.estimate_ready_time_at(id, avg_duration, Utc::now())
    }

    /// Coarse linear ETA: `now + unmet direct deps × avg_duration`.
    ///
    /// Ready and completed tasks are ready `now`; blocked and failed tasks
    /// have no ETA.
    pub fn estimate_ready_time_at(
        &self,
        id: &str,
        avg_duration: Duration,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let record = self.readiness(id)?;
        match record.state {
            ReadinessState::Ready | ReadinessState::Completed => Some(now),
            ReadinessState::Blocked | ReadinessState::Failed => None,
            ReadinessState::Waiting | ReadinessState::Running => {
                let unmet = u32::try_from(record.waiting_on.len()).unwrap_or(u32::MAX);
                let delta = TimeDelta::from_std(avg_duration.saturating_mul(unmet)).ok()?;
                now.checked_add_signed(delta)
            }
        }
    }

    fn refresh(&mut self, id: &str) -> Option<ReadinessState> {
        let record = self.compute(id)?;
        let state = record.state;
        self.records.insert(id.to_string(), record);
        Some(state)
    }

    fn dependents_owned(&self, id: &str) -> Vec<TaskId> {
        self.graph
            .dependents_of(id)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn externally_blocked(&self, id: &str) -> bool {
        self.blocking
            .as_ref()
            .is_some_and(|source| source.is_blocked(id))
    }

    fn compute(&self, id: &str) -> Option<TaskReadiness> {
        if !self.graph.contains(id) {
            return None;
        }

        let mut waiting_on = Vec::new();
        let mut blocked_by = Vec::new();
        let mut completed_deps = Vec::new();

        for dep in self.graph.dependencies_of(id) {
            if self.completed.contains(dep) {
                completed_deps.push(dep.to_string());
            } else if self.failed.contains(dep) || self.externally_blocked(dep) {
                blocked_by.push(dep.to_string());
            } else {
                waiting_on.push(dep.to_string());
            }
        }

        let total = waiting_on.len() + blocked_by.len() + completed_deps.len();
        let progress = if total == 0 {
            100
        } else {
            (100.0 * completed_deps.len() as f64 / total as f64).round() as u8
        };

        let state = if self.completed.contains(id) {
            ReadinessState::Completed
        } else if self.failed.contains(id) {
            ReadinessState::Failed
        } else if self.running.contains(id) {
            ReadinessState::Running
        } else if !blocked_by.is_empty() {
            ReadinessState::Blocked
        } else if !waiting_on.is_empty() {
            ReadinessState::Waiting
        } else {
            ReadinessState::Ready
        };

        Some(TaskReadiness {
            task_id: id.to_string(),
            state,
            waiting_on,
            blocked_by,
            completed_deps,
            progress,
        })
    }

    fn unmet_chain(
        &self,
        id: &str,
        memo: &mut HashMap<TaskId, Vec<TaskId>>,
        visiting: &mut HashSet<TaskId>,
    ) -> Vec<TaskId> {
        if let Some(chain) = memo.get(id) {
            return chain.clone();
        }
        visiting.insert(id.to_string());

        let mut best: Vec<TaskId> = Vec::new();
        for dep in self.graph.dependencies_of(id) {
            if self.completed.contains(dep) || visiting.contains(dep) {
                continue;
            }
            let mut chain = self.unmet_chain(dep, memo, visiting);
            chain.push(dep.to_string());
            if chain.len() > best.len() {
                best = chain;
            }
        }

        visiting.remove(id);
        memo.insert(id.to_string(), best.clone());
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ReadinessCalculator {
        ReadinessCalculator::new(DependencyGraph::from_edges([
            ("A", vec![]),
            ("B", vec!["A"]),
            ("C", vec!["B"]),
        ]))
    }

    #[test]
    fn chain_releases_one_task_at_a_time() {
        let mut calc = chain();
        assert_eq!(calc.ready_tasks(), vec!["A"]);

        assert_eq!(calc.on_task_completed("A"), vec!["B"]);
        assert_eq!(calc.on_task_completed("B"), vec!["C"]);
    }

    #[test]
    fn failure_blocks_direct_dependent() {
        let mut calc = ReadinessCalculator::new(DependencyGraph::from_edges([
            ("A", vec![]),
            ("B", vec!["A"]),
        ]));

        assert_eq!(calc.on_task_failed("A"), vec!["B"]);
        let b = calc.readiness("B").unwrap();
        assert_eq!(b.state, ReadinessState::Blocked);
        assert_eq!(b.blocked_by, vec!["A"]);
    }

    #[test]
    fn failure_only_reaches_direct_dependents() {
        let mut calc = chain();
        assert_eq!(calc.on_task_failed("A"), vec!["B"]);
        assert_eq!(calc.readiness("C").unwrap().state, ReadinessState::Waiting);
    }

    #[test]
    fn state_precedence() {
        let mut calc = chain();
        calc.on_task_started("A");
        assert_eq!(calc.readiness("A").unwrap().state, ReadinessState::Running);

        calc.on_task_failed("A");
        assert_eq!(calc.readiness("A").unwrap().state, ReadinessState::Failed);

        calc.on_task_completed("A");
        assert_eq!(calc.readiness("A").unwrap().state, ReadinessState::Completed);
        assert_eq!(calc.readiness("B").unwrap().state, ReadinessState::Ready);
    }

    #[test]
    fn progress_is_rounded_percentage() {
        let mut calc = ReadinessCalculator::new(DependencyGraph::from_edges([
            ("A", vec![]),
            ("B", vec![]),
            ("C", vec![]),
            ("D", vec!["A", "B", "C"]),
        ]));
        assert_eq!(calc.readiness("A").unwrap().progress, 100);

        calc.on_task_completed("A");
        assert_eq!(calc.readiness("D").unwrap().progress, 33);
        calc.on_task_completed("B");
        assert_eq!(calc.readiness("D").unwrap().progress, 67);
    }

    #[test]
    fn external_block_counts_as_blocking() {
        let graph = DependencyGraph::from_edges([("A", vec![]), ("B", vec!["A"])]);
        let source: Arc<dyn BlockingSource> = Arc::new(|id: &str| id == "A");
        let mut calc = ReadinessCalculator::new(graph).with_blocking_source(source);

        let b = calc.calculate_readiness("B").unwrap();
        assert_eq!(b.state, ReadinessState::Blocked);
        assert_eq!(b.blocked_by, vec!["A"]);
    }

    #[test]
    fn retried_failure_unblocks_dependents_to_waiting() {
        let mut calc = chain();
        calc.on_task_failed("A");
        assert!(calc.on_task_retried("A"));
        assert_eq!(calc.readiness("B").unwrap().state, ReadinessState::Waiting);
        assert_eq!(calc.readiness("A").unwrap().state, ReadinessState::Ready);
        assert!(!calc.on_task_retried("A"));
    }

    #[test]
    fn initialize_from_state_seeds_sets() {
        let mut calc = chain();
        calc.initialize_from_state(vec!["A".to_string()], Vec::new(), vec!["B".to_string()]);
        assert_eq!(calc.readiness("B").unwrap().state, ReadinessState::Running);
        assert_eq!(calc.readiness("C").unwrap().state, ReadinessState::Waiting);
        assert!(calc.ready_tasks().is_empty());
    }

    #[test]
    fn ready_tasks_by_applies_comparator() {
        let mut calc = ReadinessCalculator::new(DependencyGraph::from_edges([
            ("a", vec![]),
            ("b", vec![]),
            ("c", vec![]),
        ]));
        let ordered = calc.ready_tasks_by(|x, y| y.cmp(x));
        assert_eq!(ordered, vec!["c", "b", "a"]);
    }

    #[test]
    fn critical_path_to_lists_unfinished_chain() {
        let mut calc = chain();
        assert_eq!(calc.critical_path_to("C"), vec!["A", "B"]);
        calc.on_task_completed("A");
        assert_eq!(calc.critical_path_to("C"), vec!["B"]);
        assert!(calc.critical_path_to("unknown").is_empty());
    }

    #[test]
    fn estimate_ready_time_is_linear_in_unmet_deps() {
        let mut calc = ReadinessCalculator::new(DependencyGraph::from_edges([
            ("A", vec![]),
            ("B", vec![]),
            ("C", vec!["A", "B"]),
        ]));
        let now = Utc::now();
        let avg = Duration::from_secs(60);

        assert_eq!(calc.estimate_ready_time_at("A", avg, now), Some(now));
        assert_eq!(
            calc.estimate_ready_time_at("C", avg, now),
            Some(now + TimeDelta::seconds(120))
        );

        calc.on_task_failed("A");
        assert_eq!(calc.estimate_ready_time_at("C", avg, now), None);
        assert_eq!(calc.estimate_ready_time_at("missing", avg, now), None);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut calc = chain();
        assert!(calc.on_task_completed("nope").is_empty());
        assert!(calc.on_task_failed("nope").is_empty());
        assert!(calc.calculate_readiness("nope").is_none());
    }
}
