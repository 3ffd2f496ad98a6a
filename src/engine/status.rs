// src/engine/status.rs

//! Per-task lifecycle state machine.
//!
//! Rule-driven moves go through a static transition table; an unmatched
//! `(state, trigger)` pair is rejected by returning `None` and leaves the task
//! untouched. [`TaskStatusMachine::force_status`] is the administrative escape
//! hatch and is always recorded as `forced` in the history.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::TaskId;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Blocked,
    Ready,
    InProgress,
    Verification,
    NeedsRevision,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Blocked,
        TaskStatus::Ready,
        TaskStatus::InProgress,
        TaskStatus::Verification,
        TaskStatus::NeedsRevision,
        TaskStatus::Done,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Blocked => "blocked",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Verification => "verification",
            TaskStatus::NeedsRevision => "needs-revision",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Events that move a task between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusTrigger {
    DependenciesMet,
    DependencyBlocked,
    Assigned,
    CodingComplete,
    ExecutionFailed,
    VerificationPassed,
    VerificationFailed,
    MaxRetriesExceeded,
    RevisionStarted,
    Retry,
    Cancel,
}

impl StatusTrigger {
    pub const ALL: [StatusTrigger; 11] = [
        StatusTrigger::DependenciesMet,
        StatusTrigger::DependencyBlocked,
        StatusTrigger::Assigned,
        StatusTrigger::CodingComplete,
        StatusTrigger::ExecutionFailed,
        StatusTrigger::VerificationPassed,
        StatusTrigger::VerificationFailed,
        StatusTrigger::MaxRetriesExceeded,
        StatusTrigger::RevisionStarted,
        StatusTrigger::Retry,
        StatusTrigger::Cancel,
    ];
}

/// The transition table.
fn next_status(from: TaskStatus, trigger: StatusTrigger) -> Option<TaskStatus> {
    use StatusTrigger as T;
    use TaskStatus as S;

    match (from, trigger) {
        (S::Blocked, T::DependenciesMet) => Some(S::Ready),
        (S::Ready, T::DependencyBlocked) => Some(S::Blocked),
        (S::Ready, T::Assigned) => Some(S::InProgress),
        (S::InProgress, T::CodingComplete) => Some(S::Verification),
        (S::InProgress, T::ExecutionFailed) => Some(S::Failed),
        (S::Verification, T::VerificationPassed) => Some(S::Done),
        (S::Verification, T::VerificationFailed) => Some(S::NeedsRevision),
        (S::Verification, T::MaxRetriesExceeded) => Some(S::Failed),
        (S::NeedsRevision, T::RevisionStarted) => Some(S::InProgress),
        (S::NeedsRevision, T::MaxRetriesExceeded) => Some(S::Failed),
        (S::Failed, T::Retry) => Some(S::Ready),
        (
            S::Blocked | S::Ready | S::InProgress | S::Verification | S::NeedsRevision,
            T::Cancel,
        ) => Some(S::Cancelled),
        _ => None,
    }
}

/// One entry in a task's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusHistoryEntry {
    pub from: TaskStatus,
    pub to: TaskStatus,
    /// `None` for forced entries.
    pub trigger: Option<StatusTrigger>,
    pub at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    pub forced: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
struct StatusRecord {
    current: TaskStatus,
    history: Vec<StatusHistoryEntry>,
}

#[derive(Debug, Default)]
pub struct TaskStatusMachine {
    records: HashMap<TaskId, StatusRecord>,
    /// Initialisation order, for deterministic listings.
    order: Vec<TaskId>,
}

impl TaskStatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task as `Blocked` (has dependencies) or `Ready`.
    ///
    /// Re-initialising a known task keeps its history and appends a forced
    /// entry for the new initial state.
    pub fn initialize_task(&mut self, id: &str, has_dependencies: bool) -> TaskStatus {
        let status = if has_dependencies {
            TaskStatus::Blocked
        } else {
            TaskStatus::Ready
        };

        if self.records.contains_key(id) {
            self.force_status(id, status, "re-initialised");
            return status;
        }

        self.records.insert(
            id.to_string(),
            StatusRecord {
                current: status,
                history: Vec::new(),
            },
        );
        self.order.push(id.to_string());

        debug!(task = %id, %status, "task status initialised");
        status
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.records.get(id).map(|r| r.current)
    }

    /// Apply `trigger` to `id`. Returns the new status, or `None` if the task
    /// is unknown or the transition is not allowed.
    pub fn transition(&mut self, id: &str, trigger: StatusTrigger) -> Option<TaskStatus> {
        self.transition_with(id, trigger, BTreeMap::new())
    }

    pub fn transition_with(
        &mut self,
        id: &str,
        trigger: StatusTrigger,
        metadata: BTreeMap<String, String>,
    ) -> Option<TaskStatus> {
        let record = self.records.get_mut(id)?;
        let from = record.current;

        let Some(to) = next_status(from, trigger) else {
            debug!(task = %id, %from, ?trigger, "transition rejected");
            return None;
        };

        record.current = to;
        record.history.push(StatusHistoryEntry {
            from,
            to,
            trigger: Some(trigger),
            at: Utc::now(),
            metadata,
            forced: false,
            reason: None,
        });

        debug!(task = %id, %from, %to, ?trigger, "task status transition");
        Some(to)
    }

    pub fn can_transition(&self, id: &str, trigger: StatusTrigger) -> bool {
        self.status_of(id)
            .and_then(|from| next_status(from, trigger))
            .is_some()
    }

    /// Triggers accepted from the task's current state.
    pub fn valid_triggers(&self, id: &str) -> Vec<StatusTrigger> {
        let Some(from) = self.status_of(id) else {
            return Vec::new();
        };
        StatusTrigger::ALL
            .into_iter()
            .filter(|&t| next_status(from, t).is_some())
            .collect()
    }

    /// Overwrite the state regardless of the transition table.
    ///
    /// Returns the previous status, or `None` for unknown tasks.
    pub fn force_status(
        &mut self,
        id: &str,
        status: TaskStatus,
        reason: impl Into<String>,
    ) -> Option<TaskStatus> {
        let Some(record) = self.records.get_mut(id) else {
            warn!(task = %id, %status, "force_status on unknown task; ignoring");
            return None;
        };

        let from = record.current;
        let reason = reason.into();
        record.current = status;
        record.history.push(StatusHistoryEntry {
            from,
            to: status,
            trigger: None,
            at: Utc::now(),
            metadata: BTreeMap::new(),
            forced: true,
            reason: Some(reason.clone()),
        });

        info!(task = %id, %from, to = %status, %reason, "task status forced");
        Some(from)
    }

    /// History of `id`, earliest first. Empty for unknown tasks.
    pub fn history(&self, id: &str) -> &[StatusHistoryEntry] {
        self.records
            .get(id)
            .map(|r| r.history.as_slice())
            .unwrap_or(&[])
    }

    /// Number of tasks in every state (zero counts included).
    pub fn summary(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for record in self.records.values() {
            *counts.entry(record.current).or_insert(0) += 1;
        }
        counts
    }

    /// Tasks currently in `status`, in initialisation order.
    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.status_of(id) == Some(status))
            .cloned()
            .collect()
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}
