// src/engine/core.rs

//! Pure core orchestrator.
//!
//! This module contains a synchronous, deterministic context object that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - forwarding verification requests to the router
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::{PlanFile, TaskConfig};
use crate::dag::{DependencyGraph, ReadinessCalculator, ReadinessState};
use crate::engine::event_handlers::{CoreCommand, CoreStep, ScheduledTask};
use crate::engine::queue::PriorityQueue;
use crate::engine::status::{StatusTrigger, TaskStatus, TaskStatusMachine};
use crate::engine::{RuntimeEvent, RuntimeOptions, TaskId};
use crate::verify::VerificationRequest;

/// Entry in the ready queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) priority: i32,
    pub(crate) seq: u64,
    /// Re-dispatch after a failed verification.
    pub(crate) revision: bool,
}

/// Higher priority first, then first-enqueued first.
fn dispatch_order(a: &QueuedTask, b: &QueuedTask) -> Ordering {
    b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq))
}

/// Pure orchestrator state.
///
/// This owns:
/// - the readiness calculator (and through it the dependency graph)
/// - the task status machine
/// - the ready queue
/// - per-task plan configuration
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct Orchestrator {
    pub(crate) readiness: ReadinessCalculator,
    pub(crate) status: TaskStatusMachine,
    pub(crate) queue: PriorityQueue<QueuedTask>,
    pub(crate) tasks: HashMap<TaskId, TaskConfig>,
    /// Tasks whose work is currently executing (occupying a slot).
    pub(crate) executing: HashSet<TaskId>,
    /// Changed files last submitted for verification, per task.
    pub(crate) verifying_files: HashMap<TaskId, Vec<String>>,
    attempts: HashMap<TaskId, u32>,
    options: RuntimeOptions,
    next_seq: u64,
}

impl Orchestrator {
    /// Build from a dependency graph and per-task configuration.
    ///
    /// Graph nodes without an entry in `tasks` get a default configuration.
    pub fn new(
        graph: DependencyGraph,
        tasks: BTreeMap<TaskId, TaskConfig>,
        options: RuntimeOptions,
    ) -> Self {
        let mut status = TaskStatusMachine::new();
        for id in graph.nodes() {
            status.initialize_task(id, !graph.dependencies_of(id).is_empty());
        }

        Self {
            readiness: ReadinessCalculator::new(graph),
            status,
            queue: PriorityQueue::new(dispatch_order),
            tasks: tasks.into_iter().collect(),
            executing: HashSet::new(),
            verifying_files: HashMap::new(),
            attempts: HashMap::new(),
            options,
            next_seq: 0,
        }
    }

    pub fn from_plan(plan: &PlanFile, options: RuntimeOptions) -> Self {
        Self::new(plan.graph(), plan.task.clone(), options)
    }

    /// Seed progress from durable state.
    ///
    /// Completed tasks are forced to `done`, failed ones to `failed`, and
    /// every other task's status is re-synchronised with its readiness.
    pub fn initialize_from_state<I, J>(&mut self, completed: I, failed: J)
    where
        I: IntoIterator<Item = TaskId>,
        J: IntoIterator<Item = TaskId>,
    {
        let completed: Vec<TaskId> = completed.into_iter().collect();
        let failed: Vec<TaskId> = failed.into_iter().collect();

        self.readiness
            .initialize_from_state(completed.clone(), failed.clone(), Vec::<TaskId>::new());

        for id in &completed {
            self.status.force_status(id, TaskStatus::Done, "restored from state");
        }
        for id in &failed {
            self.status.force_status(id, TaskStatus::Failed, "restored from state");
        }

        let ids: Vec<TaskId> = self.task_ids();
        for id in ids {
            self.sync_status_with_readiness(&id);
        }
    }

    /// Enqueue every ready task and dispatch the first batch.
    pub fn start(&mut self) -> CoreStep {
        for id in self.readiness.ready_tasks() {
            if self.status.status_of(&id) == Some(TaskStatus::Ready) {
                self.enqueue(&id, false);
            }
        }
        info!(
            queued = self.queue.len(),
            max_parallel = self.max_parallel(),
            "orchestrator started"
        );
        let commands = self.dispatch();
        self.finish(commands)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskFinished {
                task,
                outcome,
                changed_files,
            } => self.handle_task_finished(task, outcome, changed_files),
            RuntimeEvent::ArtifactsChanged { task, files } => {
                self.handle_artifacts_changed(task, files)
            }
            RuntimeEvent::VerificationFinished(outcome) => {
                self.handle_verification_finished(outcome)
            }
            RuntimeEvent::RetryTask { task } => self.retry_task(&task),
            RuntimeEvent::CancelTask { task, reason } => self.cancel_task(&task, &reason),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: vec![CoreCommand::RequestExit],
                keep_running: false,
            },
        }
    }

    pub fn status(&self) -> &TaskStatusMachine {
        &self.status
    }

    pub fn readiness(&self) -> &ReadinessCalculator {
        &self.readiness
    }

    pub fn graph(&self) -> &DependencyGraph {
        self.readiness.graph()
    }

    /// Queued task IDs in dispatch order.
    pub fn queued(&self) -> Vec<TaskId> {
        self.queue
            .to_sorted_vec()
            .into_iter()
            .map(|q| q.id)
            .collect()
    }

    pub fn executing_count(&self) -> usize {
        self.executing.len()
    }

    /// Nothing executing, queued, or waiting on verification.
    pub fn is_idle(&self) -> bool {
        self.executing.is_empty()
            && self.queue.is_empty()
            && self.status.tasks_by_status(TaskStatus::InProgress).is_empty()
            && self.status.tasks_by_status(TaskStatus::Verification).is_empty()
            && self.status.tasks_by_status(TaskStatus::NeedsRevision).is_empty()
    }

    fn max_parallel(&self) -> usize {
        self.options.max_parallel.max(1)
    }

    pub(crate) fn task_ids(&self) -> Vec<TaskId> {
        self.readiness.graph().nodes().map(str::to_string).collect()
    }

    pub(crate) fn priority_of(&self, id: &str) -> i32 {
        self.tasks.get(id).map_or(0, |t| t.priority)
    }

    pub(crate) fn enqueue(&mut self, id: &str, revision: bool) {
        if self.queue.has(|q| q.id == id) {
            return;
        }
        self.next_seq += 1;
        let entry = QueuedTask {
            id: id.to_string(),
            priority: self.priority_of(id),
            seq: self.next_seq,
            revision,
        };
        debug!(task = %id, priority = entry.priority, revision, "task queued");
        self.queue.enqueue(entry);
    }

    /// Move queued tasks into free executor slots, highest priority first.
    pub(crate) fn dispatch(&mut self) -> Vec<CoreCommand> {
        let mut scheduled = Vec::new();

        while self.executing.len() < self.max_parallel() {
            let Some(next) = self.queue.dequeue() else {
                break;
            };

            let trigger = if next.revision {
                StatusTrigger::RevisionStarted
            } else {
                StatusTrigger::Assigned
            };
            if self.status.transition(&next.id, trigger).is_none() {
                debug!(task = %next.id, ?trigger, "queued task no longer dispatchable; dropping");
                continue;
            }

            self.readiness.on_task_started(&next.id);
            self.executing.insert(next.id.clone());

            let attempt = self.attempts.entry(next.id.clone()).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;

            let config = self.tasks.get(&next.id);
            info!(
                task = %next.id,
                priority = next.priority,
                attempt,
                "dispatching task"
            );

            scheduled.push(ScheduledTask {
                id: next.id,
                cmd: config.and_then(|c| c.cmd.clone()),
                artifacts: config.map(|c| c.artifacts.clone()).unwrap_or_default(),
                priority: next.priority,
                attempt,
            });
        }

        if scheduled.is_empty() {
            Vec::new()
        } else {
            vec![CoreCommand::DispatchTasks(scheduled)]
        }
    }

    pub(crate) fn verification_request(
        &self,
        id: &str,
        changed_files: Vec<String>,
    ) -> VerificationRequest {
        let config = self.tasks.get(id);
        VerificationRequest {
            task_id: id.to_string(),
            changed_files,
            acceptance_criteria: config.map(|c| c.acceptance.clone()).unwrap_or_default(),
            priority: self.priority_of(id),
            full_suite: config.is_some_and(|c| c.full_suite),
        }
    }

    /// Block ready dependents of a task that just failed.
    pub(crate) fn propagate_failure(&mut self, id: &str) {
        for dependent in self.readiness.on_task_failed(id) {
            if self.status.status_of(&dependent) == Some(TaskStatus::Ready) {
                self.status
                    .transition(&dependent, StatusTrigger::DependencyBlocked);
                self.queue.remove(|q| q.id == dependent);
            }
            warn!(task = %dependent, failed = %id, "task blocked by failed dependency");
        }
    }

    /// Align a non-running task's status with its readiness record.
    pub(crate) fn sync_status_with_readiness(&mut self, id: &str) {
        let Some(record) = self.readiness.readiness(id) else {
            return;
        };
        match (self.status.status_of(id), record.state) {
            (Some(TaskStatus::Blocked), ReadinessState::Ready) => {
                self.status.transition(id, StatusTrigger::DependenciesMet);
            }
            (Some(TaskStatus::Ready), ReadinessState::Blocked | ReadinessState::Waiting) => {
                self.status.transition(id, StatusTrigger::DependencyBlocked);
            }
            _ => {}
        }
    }

    /// Wrap `commands` into a step, requesting exit when idle if configured.
    pub(crate) fn finish(&self, mut commands: Vec<CoreCommand>) -> CoreStep {
        let mut keep_running = true;
        if self.options.exit_when_idle && self.is_idle() {
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }
        CoreStep {
            commands,
            keep_running,
        }
    }
}
