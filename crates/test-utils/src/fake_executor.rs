use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use taskorch::engine::{RuntimeEvent, ScheduledTask, TaskOutcome};
use taskorch::errors::Result;
use taskorch::exec::ExecutorBackend;

/// A fake executor that:
/// - records which tasks were "run", in dispatch order
/// - immediately reports `TaskFinished` for each scheduled task, with the
///   task's declared artifacts as changed files
/// - fails (exit code 1) every task listed via [`FakeExecutor::failing`].
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, tasks: &[&str]) -> Self {
        self.failing = tasks.iter().map(|t| t.to_string()).collect();
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(t.id.clone());
                }

                let (outcome, changed_files) = if failing.contains(&t.id) {
                    (TaskOutcome::Failed(1), Vec::new())
                } else {
                    (TaskOutcome::Success, t.artifacts.clone())
                };

                tx.send(RuntimeEvent::TaskFinished {
                    task: t.id.clone(),
                    outcome,
                    changed_files,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
