#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use taskorch::config::PlanFile;
use taskorch::engine::{Orchestrator, Runtime, RuntimeEvent, RuntimeOptions};
use taskorch::verify::VerificationRouter;

pub use taskorch_test_utils::builders::{PlanFileBuilder, TaskConfigBuilder};
pub use taskorch_test_utils::fake_executor::FakeExecutor;
pub use taskorch_test_utils::fake_test_runner::FakeTestRunner;
pub use taskorch_test_utils::{init_tracing, with_timeout};

/// Result of driving a plan to completion with fakes.
pub struct RunOutcome {
    pub core: Orchestrator,
    pub executed: Vec<String>,
}

/// Run `plan` through the real runtime with a [`FakeExecutor`] and the given
/// test runner. `failing` tasks report a non-zero exit code.
pub async fn run_plan(plan: &PlanFile, runner: FakeTestRunner, failing: &[&str]) -> RunOutcome {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));

    let executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed)).failing(failing);
    let router = VerificationRouter::new(plan.router_options()).with_test_runner(runner);
    let options = RuntimeOptions {
        max_parallel: plan.config.max_parallel,
        exit_when_idle: true,
    };
    let core = Orchestrator::from_plan(plan, options);

    let core = with_timeout(Runtime::new(core, rx, executor, router).run())
        .await
        .expect("runtime failed");

    let executed = executed.lock().unwrap().clone();
    RunOutcome { core, executed }
}
