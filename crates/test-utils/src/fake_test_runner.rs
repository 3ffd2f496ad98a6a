use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use taskorch::verify::{TestReport, TestRunRequest, TestRunner};

/// A scripted test runner.
///
/// Each task gets a queue of pass/fail results; once a task's script is
/// exhausted (or it never had one) every run passes. Every request is
/// recorded for later assertions.
#[derive(Clone, Default)]
pub struct FakeTestRunner {
    script: Arc<Mutex<HashMap<String, VecDeque<bool>>>>,
    calls: Arc<Mutex<Vec<TestRunRequest>>>,
}

impl FakeTestRunner {
    pub fn passing() -> Self {
        Self::default()
    }

    /// Queue results for `task`, consumed one per run.
    pub fn script(self, task: &str, results: &[bool]) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .extend(results.iter().copied());
        self
    }

    /// Shared handle to the recorded requests.
    pub fn calls(&self) -> Arc<Mutex<Vec<TestRunRequest>>> {
        Arc::clone(&self.calls)
    }
}

impl TestRunner for FakeTestRunner {
    fn run_tests(
        &self,
        request: TestRunRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TestReport>> + Send + '_>> {
        let passed = self
            .script
            .lock()
            .unwrap()
            .get_mut(&request.task_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(true);
        self.calls.lock().unwrap().push(request.clone());

        Box::pin(async move {
            Ok(TestReport {
                passed,
                exit_code: Some(if passed { 0 } else { 1 }),
                full_suite: request.full_suite,
                coverage: request.collect_coverage,
                output: String::new(),
            })
        })
    }
}
