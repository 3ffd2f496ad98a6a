// src/engine/event_handlers.rs

//! Event handling logic for the orchestrator.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::ReadinessState;
use crate::engine::core::Orchestrator;
use crate::engine::status::{StatusTrigger, TaskStatus};
use crate::engine::{TaskId, TaskOutcome};
use crate::verify::{VerificationOutcome, VerificationRequest};

/// A task handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    /// Shell command; `None` means there is nothing to execute.
    pub cmd: Option<String>,
    /// Declared artifacts, reported back as changed files on success.
    pub artifacts: Vec<String>,
    pub priority: i32,
    /// 1 for the first dispatch, incremented on every revision or retry.
    pub attempt: u32,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Hand a finished task to the verification router.
    QueueVerification(VerificationRequest),
    /// Restart the stability wait for a task under verification.
    ResetStabilityTimer(TaskId),
    /// Drop any pending verification for a task.
    CancelVerification(TaskId),
    /// Stop a task's running process.
    StopTask(TaskId),
    /// Request that the runtime exits.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl Orchestrator {
    pub(crate) fn handle_task_finished(
        &mut self,
        task: TaskId,
        outcome: TaskOutcome,
        changed_files: Vec<String>,
    ) -> CoreStep {
        let mut commands = Vec::new();

        if !self.executing.remove(&task) {
            warn!(task = %task, "completion for a task that is not executing; ignoring");
            return self.finish(commands);
        }

        match outcome {
            TaskOutcome::Success => {
                if self
                    .status
                    .transition(&task, StatusTrigger::CodingComplete)
                    .is_some()
                {
                    info!(task = %task, files = changed_files.len(), "task finished; verifying");
                    self.verifying_files
                        .insert(task.clone(), changed_files.clone());
                    commands.push(CoreCommand::QueueVerification(
                        self.verification_request(&task, changed_files),
                    ));
                } else {
                    // Cancelled while executing.
                    self.readiness.on_task_stopped(&task);
                }
            }
            TaskOutcome::Failed(code) => {
                let mut meta = BTreeMap::new();
                meta.insert("exit_code".to_string(), code.to_string());
                if self
                    .status
                    .transition_with(&task, StatusTrigger::ExecutionFailed, meta)
                    .is_some()
                {
                    warn!(task = %task, exit_code = code, "task execution failed");
                    self.propagate_failure(&task);
                } else {
                    self.readiness.on_task_stopped(&task);
                }
            }
        }

        commands.extend(self.dispatch());
        self.finish(commands)
    }

    /// More changes while verifying: merge them and restart the wait.
    pub(crate) fn handle_artifacts_changed(&mut self, task: TaskId, files: Vec<String>) -> CoreStep {
        let mut commands = Vec::new();

        if self.status.status_of(&task) != Some(TaskStatus::Verification) {
            debug!(task = %task, "artifact change outside verification; ignoring");
            return self.finish(commands);
        }

        let known = self.verifying_files.entry(task.clone()).or_default();
        let before = known.len();
        for file in files {
            if !known.contains(&file) {
                known.push(file);
            }
        }

        if known.len() == before {
            commands.push(CoreCommand::ResetStabilityTimer(task));
        } else {
            let merged = known.clone();
            commands.push(CoreCommand::QueueVerification(
                self.verification_request(&task, merged),
            ));
        }

        self.finish(commands)
    }

    pub(crate) fn handle_verification_finished(&mut self, outcome: VerificationOutcome) -> CoreStep {
        let task = outcome.task_id().to_string();
        let mut commands = Vec::new();

        match outcome {
            VerificationOutcome::Passed(result) => {
                let mut meta = BTreeMap::new();
                meta.insert("score".to_string(), format!("{:.2}", result.score));
                if self
                    .status
                    .transition_with(&task, StatusTrigger::VerificationPassed, meta)
                    .is_some()
                {
                    self.verifying_files.remove(&task);
                    let newly_ready = self.readiness.on_task_completed(&task);
                    info!(task = %task, ?newly_ready, "task done");
                    for dependent in newly_ready {
                        self.release(&dependent);
                    }
                }
            }
            VerificationOutcome::Failed { retry_count, .. } => {
                let mut meta = BTreeMap::new();
                meta.insert("retry_count".to_string(), retry_count.to_string());
                if self
                    .status
                    .transition_with(&task, StatusTrigger::VerificationFailed, meta)
                    .is_some()
                {
                    info!(task = %task, retry_count, "verification failed; revision queued");
                    self.enqueue(&task, true);
                }
            }
            VerificationOutcome::MaxRetriesExceeded { retry_count, .. } => {
                let mut meta = BTreeMap::new();
                meta.insert("retry_count".to_string(), retry_count.to_string());
                if self
                    .status
                    .transition_with(&task, StatusTrigger::MaxRetriesExceeded, meta)
                    .is_some()
                {
                    warn!(task = %task, retry_count, "verification escalated; task failed");
                    self.verifying_files.remove(&task);
                    self.propagate_failure(&task);
                }
            }
        }

        commands.extend(self.dispatch());
        self.finish(commands)
    }

    /// Clear a failure and queue the task again.
    ///
    /// Dependents move from blocked back to waiting; they become ready only
    /// once the task completes.
    pub fn retry_task(&mut self, task: &str) -> CoreStep {
        let mut commands = Vec::new();

        if self.status.transition(task, StatusTrigger::Retry).is_none() {
            warn!(task = %task, "retry requested for a task that has not failed; ignoring");
            return self.finish(commands);
        }

        self.readiness.on_task_retried(task);
        match self.readiness.readiness(task).map(|r| r.state) {
            Some(ReadinessState::Ready) => self.enqueue(task, false),
            _ => {
                self.status.transition(task, StatusTrigger::DependencyBlocked);
            }
        }
        info!(task = %task, "task retried");

        commands.extend(self.dispatch());
        self.finish(commands)
    }

    /// Cancel a task that has not reached a terminal state.
    ///
    /// A task whose process is still running keeps its executor slot until
    /// the stopped process reports back.
    pub fn cancel_task(&mut self, task: &str, reason: &str) -> CoreStep {
        let mut commands = Vec::new();

        let mut meta = BTreeMap::new();
        meta.insert("reason".to_string(), reason.to_string());
        if self
            .status
            .transition_with(task, StatusTrigger::Cancel, meta)
            .is_none()
        {
            warn!(task = %task, "cancel requested for a task that cannot be cancelled");
            return self.finish(commands);
        }

        self.queue.remove(|q| q.id == task);
        self.verifying_files.remove(task);
        info!(task = %task, %reason, "task cancelled");

        commands.push(CoreCommand::CancelVerification(task.to_string()));
        if self.executing.contains(task) {
            commands.push(CoreCommand::StopTask(task.to_string()));
        } else {
            self.readiness.on_task_stopped(task);
        }
        commands.extend(self.dispatch());
        self.finish(commands)
    }

    /// A dependent whose dependencies are now all complete.
    fn release(&mut self, id: &str) {
        if self.status.status_of(id) == Some(TaskStatus::Blocked) {
            self.status.transition(id, StatusTrigger::DependenciesMet);
        }
        if self.status.status_of(id) == Some(TaskStatus::Ready) {
            self.enqueue(id, false);
        }
    }
}
