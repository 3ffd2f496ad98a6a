// src/exec/executor_loop.rs

//! Main executor loop that manages running task processes.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::{RuntimeEvent, ScheduledTask, TaskId};
use crate::exec::task_runner::run_task;

/// Requests accepted by the executor loop.
#[derive(Debug)]
pub enum ExecutorMessage {
    Run(ScheduledTask),
    Stop(TaskId),
}

/// Internal handle for a currently-running task process.
///
/// - `stop` is used by the executor to request that the process be killed
///   (when the task is cancelled).
/// - `handle` is the Tokio task that is actually running the command.
struct ActiveTask {
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what `CommandExecutorBackend` forwards to. Each
/// scheduled task is executed in its own Tokio task, and **per task ID there
/// will never be more than one process running at the same time**: a run
/// request for a task that is still running is ignored.
pub fn spawn_executor(runtime_tx: mpsc::Sender<RuntimeEvent>) -> mpsc::Sender<ExecutorMessage> {
    let (tx, mut rx) = mpsc::channel::<ExecutorMessage>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        // At most one ActiveTask per task ID.
        let mut active: HashMap<TaskId, ActiveTask> = HashMap::new();

        while let Some(message) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());
            match message {
                ExecutorMessage::Run(task) => start_task(task, &mut active, &runtime_tx),
                ExecutorMessage::Stop(id) => stop_task(&id, &mut active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn start_task(
    task: ScheduledTask,
    active: &mut HashMap<TaskId, ActiveTask>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    if active.contains_key(&task.id) {
        warn!(
            task = %task.id,
            attempt = task.attempt,
            "task already running; ignoring new run request"
        );
        return;
    }

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let id = task.id.clone();
    let spawn_id = id.clone();

    let handle = tokio::spawn(async move {
        run_task(task, rt_tx, stop_rx).await;
        debug!(task = %spawn_id, "task runner future finished");
    });

    active.insert(
        id,
        ActiveTask {
            stop: Some(stop_tx),
            handle,
        },
    );
}

fn stop_task(id: &str, active: &mut HashMap<TaskId, ActiveTask>) {
    let Some(existing) = active.get_mut(id) else {
        debug!(task = %id, "stop requested for a task that is not running");
        return;
    };

    info!(task = %id, "stopping task process");
    if let Some(stop) = existing.stop.take() {
        if stop.send(()).is_err() {
            debug!(task = %id, "process already finished while stopping");
        }
    }
}
