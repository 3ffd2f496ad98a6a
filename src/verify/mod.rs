// src/verify/mod.rs

//! Post-completion verification.
//!
//! - [`router`] owns pending verifications, their stability timers, bounded
//!   retries and escalation.
//! - [`timer`] is the cancellable one-shot timer the router schedules with.
//! - [`matcher`] checks acceptance criteria against changed artifacts.
//! - [`runner`] runs the project's test command.

use serde::{Deserialize, Serialize};

use crate::engine::TaskId;

pub mod matcher;
pub mod router;
pub mod runner;
pub mod timer;

pub use matcher::{CriteriaMatcher, GlobMatcher};
pub use router::{
    DueVerification, RouterOptions, VerificationEvent, VerificationObserver, VerificationRouter,
};
pub use runner::{CommandTestRunner, TestReport, TestRunRequest, TestRunner};
pub use timer::{TimerHandle, schedule};

/// A single acceptance criterion attached to a task.
///
/// ```toml
/// [[task.api.acceptance]]
/// id = "handlers"
/// description = "request handlers are implemented"
/// patterns = ["src/api/**/*.rs"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Glob patterns checked against changed artifact paths.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// What the router is asked to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub task_id: TaskId,
    pub changed_files: Vec<String>,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    /// Presentational only; does not affect execution order.
    pub priority: i32,
    pub full_suite: bool,
}

impl VerificationRequest {
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            changed_files: Vec::new(),
            acceptance_criteria: Vec::new(),
            priority: 0,
            full_suite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionResult {
    pub criterion_id: String,
    pub satisfied: bool,
    pub matched_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub task_id: TaskId,
    pub passed: bool,
    /// Fraction of checks that passed, `0.0..=1.0`.
    pub score: f64,
    /// One entry per submitted criterion, in submission order.
    pub criteria_results: Vec<CriterionResult>,
    pub test_report: Option<TestReport>,
}

/// Decision emitted by the router after a verification run.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Passed(VerificationResult),
    /// Failed, but the task may be revised and resubmitted.
    Failed {
        result: VerificationResult,
        retry_count: u32,
    },
    /// Failed and the retry bound is exhausted.
    MaxRetriesExceeded {
        result: VerificationResult,
        retry_count: u32,
    },
}

impl VerificationOutcome {
    pub fn result(&self) -> &VerificationResult {
        match self {
            VerificationOutcome::Passed(result)
            | VerificationOutcome::Failed { result, .. }
            | VerificationOutcome::MaxRetriesExceeded { result, .. } => result,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.result().task_id
    }

    pub fn passed(&self) -> bool {
        matches!(self, VerificationOutcome::Passed(_))
    }
}
