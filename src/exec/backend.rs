// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`].
//!
//! - `CommandExecutorBackend` is the default implementation used by
//!   `taskorch`. It wraps the `spawn_executor` loop and forwards scheduled
//!   tasks and stop requests over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskFinished` events.
//!
//! [`executor_loop`]: crate::exec::executor_loop

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{RuntimeEvent, ScheduledTask, TaskId};
use crate::errors::{Error, Result};

use super::executor_loop::{ExecutorMessage, spawn_executor};

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`CommandExecutorBackend`]; tests can provide their
/// own implementation that doesn't spawn real processes.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Every dispatched task must eventually be reported back with a
    /// `RuntimeEvent::TaskFinished`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stop a running task. The task is still reported back as finished.
    ///
    /// The default does nothing, for backends whose tasks finish on their own.
    fn stop_task(&mut self, _task: TaskId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Executor backend that runs each task's `cmd` through the platform shell.
pub struct CommandExecutorBackend {
    tx: mpsc::Sender<ExecutorMessage>,
}

impl CommandExecutorBackend {
    /// Create a new command executor backend, wiring it to the given runtime
    /// event sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(runtime_tx);
        Self { tx }
    }
}

impl ExecutorBackend for CommandExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(ExecutorMessage::Run(task))
                    .await
                    .map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn stop_task(&mut self, task: TaskId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            tx.send(ExecutorMessage::Stop(task))
                .await
                .map_err(Error::from)?;
            Ok(())
        })
    }
}
