// src/dag/task_info.rs

//! Readiness records and the external blocking hook.

use std::fmt;

use serde::Serialize;

use crate::engine::TaskId;

/// Derived readiness of a task with respect to its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    /// All dependencies completed; the task may be dispatched.
    Ready,
    /// Some dependencies have not completed yet.
    Waiting,
    /// At least one dependency failed or is externally blocked.
    Blocked,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReadinessState::Ready => "ready",
            ReadinessState::Waiting => "waiting",
            ReadinessState::Blocked => "blocked",
            ReadinessState::Running => "running",
            ReadinessState::Completed => "completed",
            ReadinessState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Readiness record for a single task.
///
/// Always derivable from the graph plus the completed/failed/running sets;
/// the calculator only caches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReadiness {
    pub task_id: TaskId,
    pub state: ReadinessState,
    /// Dependencies that have not completed (and are not blocking).
    pub waiting_on: Vec<TaskId>,
    /// Dependencies that failed or are externally blocked.
    pub blocked_by: Vec<TaskId>,
    pub completed_deps: Vec<TaskId>,
    /// Percentage of dependencies completed, `0..=100`.
    pub progress: u8,
}

impl TaskReadiness {
    pub fn total_deps(&self) -> usize {
        self.waiting_on.len() + self.blocked_by.len() + self.completed_deps.len()
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }
}

/// Optional collaborator that knows about blocks outside the dependency graph
/// (e.g. a task waiting on a human or on an external ticket).
pub trait BlockingSource: Send + Sync {
    fn is_blocked(&self, task_id: &str) -> bool;
}

impl<F> BlockingSource for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_blocked(&self, task_id: &str) -> bool {
        self(task_id)
    }
}
