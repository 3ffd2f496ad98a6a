// src/verify/router.rs

//! Verification routing: stability window, execution, bounded retries and
//! escalation.
//!
//! Each queued task gets its own stability timer. When a timer expires it
//! does not run anything itself; it posts a [`DueVerification`] into the
//! router's channel. The owning loop awaits [`VerificationRouter::next_due`]
//! and hands the message back to [`VerificationRouter::run_due`]. Every
//! (re)scheduled timer gets a fresh generation number, so a message from a
//! cancelled or superseded timer is recognised as stale and ignored.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::TaskId;
use crate::verify::matcher::{CriteriaMatcher, GlobMatcher};
use crate::verify::runner::{TestReport, TestRunRequest, TestRunner};
use crate::verify::timer::{TimerHandle, schedule};
use crate::verify::{VerificationOutcome, VerificationRequest, VerificationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    /// Quiet period after the last change before verification runs.
    pub stability_window: Duration,
    /// Failed runs tolerated before escalating.
    pub max_retries: u32,
    /// Run the full suite for every request, not only those asking for it.
    pub full_suite: bool,
    pub collect_coverage: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            stability_window: Duration::from_secs(2),
            max_retries: 2,
            full_suite: false,
            collect_coverage: false,
        }
    }
}

/// Message posted by an expired stability timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueVerification {
    pub task_id: TaskId,
    pub generation: u64,
}

/// Progress notifications, delivered synchronously in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEvent {
    Queued { task_id: TaskId, retry_count: u32 },
    Started { task_id: TaskId, retry_count: u32 },
    Passed { task_id: TaskId, score: f64 },
    Failed { task_id: TaskId, retry_count: u32 },
    MaxRetriesExceeded { task_id: TaskId, retry_count: u32 },
    Cancelled { task_id: TaskId },
}

pub trait VerificationObserver: Send + Sync {
    fn on_event(&mut self, event: &VerificationEvent);
}

impl<F> VerificationObserver for F
where
    F: FnMut(&VerificationEvent) + Send + Sync,
{
    fn on_event(&mut self, event: &VerificationEvent) {
        self(event)
    }
}

struct PendingVerification {
    request: VerificationRequest,
    timer: Option<TimerHandle>,
    retry_count: u32,
    last_result: Option<VerificationResult>,
    generation: u64,
}

pub struct VerificationRouter {
    options: RouterOptions,
    matcher: Box<dyn CriteriaMatcher>,
    runner: Option<Box<dyn TestRunner>>,
    pending: HashMap<TaskId, PendingVerification>,
    observers: Vec<Box<dyn VerificationObserver>>,
    due_tx: mpsc::UnboundedSender<DueVerification>,
    due_rx: mpsc::UnboundedReceiver<DueVerification>,
    next_generation: u64,
}

impl fmt::Debug for VerificationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationRouter")
            .field("options", &self.options)
            .field("pending", &self.pending.len())
            .field("has_runner", &self.runner.is_some())
            .finish_non_exhaustive()
    }
}

impl VerificationRouter {
    /// Router with the default [`GlobMatcher`] and no test runner.
    pub fn new(options: RouterOptions) -> Self {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        Self {
            options,
            matcher: Box::new(GlobMatcher),
            runner: None,
            pending: HashMap::new(),
            observers: Vec::new(),
            due_tx,
            due_rx,
            next_generation: 0,
        }
    }

    pub fn with_matcher(mut self, matcher: impl CriteriaMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_test_runner(mut self, runner: impl TestRunner + 'static) -> Self {
        self.runner = Some(Box::new(runner));
        self
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    pub fn subscribe(&mut self, observer: impl VerificationObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, task_id: &str) -> bool {
        self.pending.contains_key(task_id)
    }

    /// Failed runs recorded so far for a pending task (0 if unknown).
    pub fn retry_count(&self, task_id: &str) -> u32 {
        self.pending.get(task_id).map_or(0, |p| p.retry_count)
    }

    pub fn last_result(&self, task_id: &str) -> Option<&VerificationResult> {
        self.pending.get(task_id)?.last_result.as_ref()
    }

    /// Queue `request`, replacing any pending entry for the same task.
    ///
    /// The previous timer is cancelled; the retry count carries over. The
    /// stability timer is spawned on the current tokio runtime; without one
    /// the entry is still queued but waits for `run_verification_now`.
    pub fn queue_verification(&mut self, request: VerificationRequest) {
        let task_id = request.task_id.clone();
        let (retry_count, last_result) = match self.pending.remove(&task_id) {
            Some(previous) => {
                if let Some(timer) = &previous.timer {
                    timer.cancel();
                }
                (previous.retry_count, previous.last_result)
            }
            None => (0, None),
        };

        let generation = self.bump_generation();
        let timer = self.start_timer(&task_id, generation);

        self.pending.insert(
            task_id.clone(),
            PendingVerification {
                request,
                timer,
                retry_count,
                last_result,
                generation,
            },
        );

        debug!(
            task = %task_id,
            retry_count,
            generation,
            window_ms = self.options.stability_window.as_millis() as u64,
            "verification queued"
        );
        self.emit(VerificationEvent::Queued {
            task_id,
            retry_count,
        });
    }

    /// Restart the stability wait for `task_id`. No-op for unknown tasks.
    ///
    /// Like [`Self::queue_verification`], needs a tokio runtime for the timer.
    pub fn reset_stability_timer(&mut self, task_id: &str) {
        if !self.pending.contains_key(task_id) {
            return;
        }
        let generation = self.bump_generation();
        let timer = self.start_timer(task_id, generation);

        if let Some(entry) = self.pending.get_mut(task_id) {
            if let Some(old) = std::mem::replace(&mut entry.timer, timer) {
                old.cancel();
            }
            entry.generation = generation;
            debug!(task = %task_id, generation, "stability timer reset");
        }
    }

    /// Skip the stability wait and verify now. `None` for unknown tasks.
    pub async fn run_verification_now(&mut self, task_id: &str) -> Option<VerificationOutcome> {
        if !self.pending.contains_key(task_id) {
            return None;
        }
        self.execute(task_id).await
    }

    /// Drop the pending entry for `task_id`. Returns whether one existed.
    pub fn cancel_verification(&mut self, task_id: &str) -> bool {
        match self.pending.remove(task_id) {
            Some(entry) => {
                if let Some(timer) = &entry.timer {
                    timer.cancel();
                }
                info!(task = %task_id, "verification cancelled");
                self.emit(VerificationEvent::Cancelled {
                    task_id: task_id.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Cancel every timer and forget every entry. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        for (task_id, entry) in self.pending.drain() {
            if let Some(timer) = &entry.timer {
                timer.cancel();
            }
            debug!(task = %task_id, "pending verification disposed");
        }
    }

    /// Wait for the next expired stability timer.
    pub async fn next_due(&mut self) -> Option<DueVerification> {
        self.due_rx.recv().await
    }

    /// Run the verification announced by `due`, unless it is stale.
    pub async fn run_due(&mut self, due: DueVerification) -> Option<VerificationOutcome> {
        let current = self.pending.get(&due.task_id).map(|p| p.generation);
        if current != Some(due.generation) {
            debug!(
                task = %due.task_id,
                generation = due.generation,
                current = ?current,
                "ignoring stale verification timer"
            );
            return None;
        }
        self.execute(&due.task_id).await
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// `None` outside a tokio runtime; the entry then only runs through
    /// [`Self::run_verification_now`].
    fn start_timer(&self, task_id: &str, generation: u64) -> Option<TimerHandle> {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(task = %task_id, "no tokio runtime; stability timer not started");
            return None;
        }
        let tx = self.due_tx.clone();
        let due = DueVerification {
            task_id: task_id.to_string(),
            generation,
        };
        Some(schedule(self.options.stability_window, move || {
            let _ = tx.send(due);
        }))
    }

    async fn execute(&mut self, task_id: &str) -> Option<VerificationOutcome> {
        // A due message posted before this run must not trigger another one.
        let generation = self.bump_generation();
        let (request, retry_count) = {
            let entry = self.pending.get_mut(task_id)?;
            if let Some(timer) = entry.timer.take() {
                timer.cancel();
            }
            entry.generation = generation;
            (entry.request.clone(), entry.retry_count)
        };

        info!(task = %task_id, retry_count, "verification started");
        self.emit(VerificationEvent::Started {
            task_id: task_id.to_string(),
            retry_count,
        });

        let result = self.evaluate(&request).await;
        self.settle(task_id, result)
    }

    async fn evaluate(&self, request: &VerificationRequest) -> VerificationResult {
        let criteria_results = self
            .matcher
            .match_criteria(&request.acceptance_criteria, &request.changed_files);

        let test_report = match self.runner.as_deref() {
            Some(runner) => {
                let run = TestRunRequest {
                    task_id: request.task_id.clone(),
                    changed_files: request.changed_files.clone(),
                    full_suite: request.full_suite || self.options.full_suite,
                    collect_coverage: self.options.collect_coverage,
                };
                match runner.run_tests(run.clone()).await {
                    Ok(report) => Some(report),
                    Err(err) => {
                        warn!(task = %request.task_id, error = %err, "test runner failed");
                        Some(TestReport::from_error(&run, &err))
                    }
                }
            }
            None => None,
        };

        let satisfied = criteria_results.iter().filter(|c| c.satisfied).count();
        let tests_passed = test_report.as_ref().map(|r| r.passed);

        let checks = criteria_results.len() + usize::from(tests_passed.is_some());
        let passed_checks = satisfied + usize::from(tests_passed == Some(true));
        let score = if checks == 0 {
            1.0
        } else {
            passed_checks as f64 / checks as f64
        };

        VerificationResult {
            task_id: request.task_id.clone(),
            passed: passed_checks == checks,
            score,
            criteria_results,
            test_report,
        }
    }

    fn settle(&mut self, task_id: &str, result: VerificationResult) -> Option<VerificationOutcome> {
        if result.passed {
            self.pending.remove(task_id);
            info!(task = %task_id, score = result.score, "verification passed");
            self.emit(VerificationEvent::Passed {
                task_id: task_id.to_string(),
                score: result.score,
            });
            return Some(VerificationOutcome::Passed(result));
        }

        let max_retries = self.options.max_retries;
        let entry = self.pending.get_mut(task_id)?;
        entry.retry_count += 1;
        let retry_count = entry.retry_count;

        if retry_count <= max_retries {
            entry.last_result = Some(result.clone());
            info!(task = %task_id, retry_count, max_retries, "verification failed");
            self.emit(VerificationEvent::Failed {
                task_id: task_id.to_string(),
                retry_count,
            });
            Some(VerificationOutcome::Failed {
                result,
                retry_count,
            })
        } else {
            self.pending.remove(task_id);
            warn!(
                task = %task_id,
                retry_count,
                max_retries,
                "verification retries exhausted; escalating"
            );
            self.emit(VerificationEvent::MaxRetriesExceeded {
                task_id: task_id.to_string(),
                retry_count,
            });
            Some(VerificationOutcome::MaxRetriesExceeded {
                result,
                retry_count,
            })
        }
    }

    fn emit(&mut self, event: VerificationEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

impl Drop for VerificationRouter {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::AcceptanceCriterion;
    use std::sync::{Arc, Mutex};
    use tokio::time::timeout;

    fn options(window_ms: u64, max_retries: u32) -> RouterOptions {
        RouterOptions {
            stability_window: Duration::from_millis(window_ms),
            max_retries,
            ..RouterOptions::default()
        }
    }

    fn request(task: &str, files: &[&str], patterns: &[&str]) -> VerificationRequest {
        VerificationRequest {
            task_id: task.to_string(),
            changed_files: files.iter().map(|f| f.to_string()).collect(),
            acceptance_criteria: vec![AcceptanceCriterion {
                id: "c1".to_string(),
                description: String::new(),
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
            }],
            priority: 0,
            full_suite: false,
        }
    }

    fn recorder(router: &mut VerificationRouter) -> Arc<Mutex<Vec<VerificationEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        router.subscribe(move |e: &VerificationEvent| sink.lock().unwrap().push(e.clone()));
        events
    }

    #[tokio::test]
    async fn unknown_task_operations_are_noops() {
        let mut router = VerificationRouter::new(options(50, 1));
        router.reset_stability_timer("ghost");
        assert!(router.run_verification_now("ghost").await.is_none());
        assert!(!router.cancel_verification("ghost"));
        assert_eq!(router.retry_count("ghost"), 0);
    }

    #[tokio::test]
    async fn pass_clears_entry() {
        let mut router = VerificationRouter::new(options(10_000, 1));
        let events = recorder(&mut router);
        router.queue_verification(request("t", &["src/a.rs"], &["src/*.rs"]));

        let outcome = router.run_verification_now("t").await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.result().score, 1.0);
        assert!(!router.is_pending("t"));

        let events = events.lock().unwrap();
        assert!(matches!(events[0], VerificationEvent::Queued { .. }));
        assert!(matches!(events[1], VerificationEvent::Started { .. }));
        assert!(matches!(events[2], VerificationEvent::Passed { .. }));
    }

    #[tokio::test]
    async fn failure_keeps_entry_until_bound() {
        let mut router = VerificationRouter::new(options(10_000, 1));
        router.queue_verification(request("t", &["README.md"], &["src/*.rs"]));

        let first = router.run_verification_now("t").await.unwrap();
        assert!(matches!(first, VerificationOutcome::Failed { retry_count: 1, .. }));
        assert!(router.is_pending("t"));
        assert!(router.last_result("t").is_some());

        // Resubmission keeps the count.
        router.queue_verification(request("t", &["README.md"], &["src/*.rs"]));
        assert_eq!(router.retry_count("t"), 1);

        let second = router.run_verification_now("t").await.unwrap();
        assert!(matches!(
            second,
            VerificationOutcome::MaxRetriesExceeded { retry_count: 2, .. }
        ));
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn timer_expiry_runs_verification() {
        let mut router = VerificationRouter::new(options(10, 0));
        router.queue_verification(request("t", &["src/a.rs"], &["src/*.rs"]));

        let due = timeout(Duration::from_secs(2), router.next_due())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(due.task_id, "t");

        let outcome = router.run_due(due).await.unwrap();
        assert!(outcome.passed());
    }

    #[tokio::test]
    async fn superseded_generation_is_stale() {
        let mut router = VerificationRouter::new(options(10_000, 0));
        router.queue_verification(request("t", &[], &[]));
        let stale = DueVerification {
            task_id: "t".to_string(),
            generation: 1,
        };
        router.reset_stability_timer("t");

        assert!(router.run_due(stale).await.is_none());
        assert!(router.is_pending("t"));
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let mut router = VerificationRouter::new(options(10_000, 0));
        router.queue_verification(request("a", &[], &[]));
        router.queue_verification(request("b", &[], &[]));

        router.dispose();
        assert_eq!(router.pending_count(), 0);
        router.dispose();
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn queue_without_runtime_keeps_entry_untimed() {
        let mut router = VerificationRouter::new(options(10, 1));
        router.queue_verification(request("t", &["src/a.rs"], &["src/*.rs"]));
        router.reset_stability_timer("t");
        assert!(router.is_pending("t"));

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outcome = rt.block_on(router.run_verification_now("t")).unwrap();
        assert!(outcome.passed());
        assert_eq!(router.pending_count(), 0);
    }
}
