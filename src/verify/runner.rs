// src/verify/runner.rs

//! Test-suite execution during verification.
//!
//! The router talks to a [`TestRunner`] instead of spawning processes itself,
//! so tests can swap in a scripted runner. [`CommandTestRunner`] runs a shell
//! command configured in the plan file's `[verification]` section.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::engine::TaskId;

/// Upper bound on captured output kept in a [`TestReport`].
const MAX_OUTPUT_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunRequest {
    pub task_id: TaskId,
    pub changed_files: Vec<String>,
    pub full_suite: bool,
    pub collect_coverage: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub full_suite: bool,
    pub coverage: bool,
    /// Tail of combined stdout/stderr, or the runner error.
    pub output: String,
}

impl TestReport {
    /// Report for a runner that could not produce a result at all.
    pub fn from_error(request: &TestRunRequest, err: &anyhow::Error) -> Self {
        Self {
            passed: false,
            exit_code: None,
            full_suite: request.full_suite,
            coverage: request.collect_coverage,
            output: format!("{err:#}"),
        }
    }
}

/// Trait abstracting how tests are run for a verification.
pub trait TestRunner: Send + Sync {
    fn run_tests(
        &self,
        request: TestRunRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TestReport>> + Send + '_>>;
}

/// Runs `test_cmd` (or `full_suite_cmd` for full-suite requests) through the
/// platform shell.
///
/// The command sees `TASKORCH_TASK`, `TASKORCH_CHANGED_FILES` (newline
/// separated) and `TASKORCH_COVERAGE` (`1` or `0`) in its environment.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    test_cmd: String,
    full_suite_cmd: Option<String>,
}

impl CommandTestRunner {
    pub fn new(test_cmd: impl Into<String>, full_suite_cmd: Option<String>) -> Self {
        Self {
            test_cmd: test_cmd.into(),
            full_suite_cmd,
        }
    }

    fn command_for(&self, request: &TestRunRequest) -> &str {
        match (&self.full_suite_cmd, request.full_suite) {
            (Some(full), true) => full,
            _ => &self.test_cmd,
        }
    }
}

impl TestRunner for CommandTestRunner {
    fn run_tests(
        &self,
        request: TestRunRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TestReport>> + Send + '_>> {
        Box::pin(async move {
            let line = self.command_for(&request);
            info!(
                task = %request.task_id,
                cmd = %line,
                full_suite = request.full_suite,
                "running verification tests"
            );

            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(line);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(line);
                c
            };

            cmd.env("TASKORCH_TASK", &request.task_id)
                .env("TASKORCH_CHANGED_FILES", request.changed_files.join("\n"))
                .env(
                    "TASKORCH_COVERAGE",
                    if request.collect_coverage { "1" } else { "0" },
                )
                .stdin(Stdio::null())
                .kill_on_drop(true);

            let output = cmd
                .output()
                .await
                .with_context(|| format!("running test command for task '{}'", request.task_id))?;

            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            let report = TestReport {
                passed: output.status.success(),
                exit_code: output.status.code(),
                full_suite: request.full_suite,
                coverage: request.collect_coverage,
                output: tail(&combined, MAX_OUTPUT_BYTES).to_string(),
            };

            debug!(
                task = %request.task_id,
                passed = report.passed,
                exit_code = ?report.exit_code,
                "test command finished"
            );
            Ok(report)
        })
    }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(full_suite: bool) -> TestRunRequest {
        TestRunRequest {
            task_id: "t".to_string(),
            changed_files: vec!["a.rs".to_string()],
            full_suite,
            collect_coverage: false,
        }
    }

    #[test]
    fn full_suite_command_is_used_only_when_requested() {
        let runner = CommandTestRunner::new("quick", Some("everything".to_string()));
        assert_eq!(runner.command_for(&request(false)), "quick");
        assert_eq!(runner.command_for(&request(true)), "everything");

        let runner = CommandTestRunner::new("quick", None);
        assert_eq!(runner.command_for(&request(true)), "quick");
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("hello", 10), "hello");
        assert_eq!(tail("hello", 3), "llo");
        assert_eq!(tail("aé", 1), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_pass() {
        let pass = CommandTestRunner::new("test \"$TASKORCH_TASK\" = t", None);
        let report = pass.run_tests(request(false)).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.exit_code, Some(0));

        let fail = CommandTestRunner::new("echo boom; exit 3", None);
        let report = fail.run_tests(request(false)).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.exit_code, Some(3));
        assert!(report.output.contains("boom"));
    }
}
