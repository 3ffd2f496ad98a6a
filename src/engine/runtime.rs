// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::ScheduledTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::verify::{DueVerification, VerificationRouter};

use super::core::Orchestrator;
use super::{CoreCommand, RuntimeEvent};

/// What woke the event loop.
enum Wake {
    Event(Option<RuntimeEvent>),
    Due(DueVerification),
}

/// Drives the orchestrator in response to `RuntimeEvent`s and expired
/// stability timers, and delegates execution to an `ExecutorBackend` and
/// verification to a `VerificationRouter`.
///
/// This is a pure IO shell around `Orchestrator`, which contains all the
/// orchestration semantics. It is the single owner of the core and the
/// router, so neither needs any locking.
pub struct Runtime<E: ExecutorBackend> {
    core: Orchestrator,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    router: VerificationRouter,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: Orchestrator,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        router: VerificationRouter,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            router,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the orchestrator (dispatching the first ready tasks).
    /// - Consumes `RuntimeEvent`s from `event_rx` and due verifications from
    ///   the router.
    /// - Feeds them into the core and executes the returned commands.
    ///
    /// Returns the orchestrator so callers can inspect the final state.
    pub async fn run(mut self) -> Result<Orchestrator> {
        info!("taskorch runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let wake = tokio::select! {
                event = self.event_rx.recv() => Wake::Event(event),
                Some(due) = self.router.next_due() => Wake::Due(due),
            };

            let event = match wake {
                Wake::Event(Some(event)) => event,
                Wake::Event(None) => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
                Wake::Due(due) => match self.router.run_due(due).await {
                    Some(outcome) => RuntimeEvent::VerificationFinished(outcome),
                    None => continue,
                },
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and get commands back.
            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                keep_running = false;
            }
        }

        self.router.dispose();
        info!(summary = ?self.core.status().summary(), "runtime exiting");
        Ok(self.core)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::QueueVerification(request) => {
                self.router.queue_verification(request);
            }
            CoreCommand::ResetStabilityTimer(task) => {
                self.router.reset_stability_timer(&task);
            }
            CoreCommand::CancelVerification(task) => {
                self.router.cancel_verification(&task);
            }
            CoreCommand::StopTask(task) => {
                self.executor.stop_task(task).await?;
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
