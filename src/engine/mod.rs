// src/engine/mod.rs

//! Orchestration engine for taskorch.
//!
//! This module ties together:
//! - the readiness calculator (which tasks may run)
//! - the ready queue (which of those runs next, by priority)
//! - the task status machine (lifecycle gate and history)
//! - the main runtime event loop that reacts to:
//!   - task completion events from the executor
//!   - artifact changes during verification
//!   - verification outcomes from the router
//!   - retry / cancel requests and shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::verify::VerificationOutcome;

/// Canonical task identifier used throughout the engine.
pub type TaskId = String;

/// Outcome of a task process for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(i32),
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Maximum number of tasks executing at the same time.
    pub max_parallel: usize,
    /// If true, exit the runtime once nothing is executing, verifying or
    /// dispatchable.
    pub exit_when_idle: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            exit_when_idle: true,
        }
    }
}

/// Events flowing into the runtime from the executor, the router, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task's work finished with a concrete outcome.
    TaskFinished {
        task: TaskId,
        outcome: TaskOutcome,
        changed_files: Vec<String>,
    },
    /// Further artifact changes were observed for a task under verification.
    ArtifactsChanged { task: TaskId, files: Vec<String> },
    /// The verification router produced a decision.
    VerificationFinished(VerificationOutcome),
    /// Operator request to retry a failed task.
    RetryTask { task: TaskId },
    /// Operator request to cancel a task.
    CancelTask { task: TaskId, reason: String },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;
pub mod status;

pub use core::Orchestrator;
pub use event_handlers::{CoreCommand, CoreStep, ScheduledTask};
pub use queue::PriorityQueue;
pub use runtime::Runtime;
pub use status::{StatusHistoryEntry, StatusTrigger, TaskStatus, TaskStatusMachine};
