// src/exec/task_runner.rs

//! Individual task process runner.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{RuntimeEvent, ScheduledTask, TaskOutcome};

/// Exit code reported when a process could not be run or was stopped.
const NO_EXIT_CODE: i32 = -1;

/// Run a single task process and report exactly one `TaskFinished` event.
///
/// - A task without `cmd` finishes successfully right away.
/// - On success, the task's declared artifacts are reported as changed files.
/// - If the stop channel fires, the child process is killed and the task is
///   reported as failed.
pub async fn run_task(
    task: ScheduledTask,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    stop_rx: oneshot::Receiver<()>,
) {
    let id = task.id.clone();
    let artifacts = task.artifacts.clone();

    let outcome = match run_task_inner(task, stop_rx).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(task = %id, error = %err, "task execution error");
            TaskOutcome::Failed(NO_EXIT_CODE)
        }
    };

    let changed_files = match outcome {
        TaskOutcome::Success => artifacts,
        TaskOutcome::Failed(_) => Vec::new(),
    };

    if runtime_tx
        .send(RuntimeEvent::TaskFinished {
            task: id.clone(),
            outcome,
            changed_files,
        })
        .await
        .is_err()
    {
        debug!(task = %id, "runtime gone; dropping TaskFinished event");
    }
}

async fn run_task_inner(
    task: ScheduledTask,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<TaskOutcome> {
    let Some(line) = task.cmd.as_deref() else {
        info!(task = %task.id, "task has no command; finishing immediately");
        return Ok(TaskOutcome::Success);
    };

    info!(
        task = %task.id,
        attempt = task.attempt,
        cmd = %line,
        "starting task process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    };

    cmd.env("TASKORCH_TASK", &task.id)
        .env("TASKORCH_ATTEMPT", task.attempt.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.id))?;

    // Always consume output so buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        forward_lines(task.id.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(task.id.clone(), "stderr", stderr);
    }

    // Either the process exits on its own (normal case), or we receive a
    // stop request (task cancelled).
    tokio::select! {
        status_res = child.wait() => {
            let status = status_res.with_context(|| {
                format!("waiting for process of task '{}'", task.id)
            })?;

            let code = status.code().unwrap_or(NO_EXIT_CODE);
            info!(
                task = %task.id,
                exit_code = code,
                success = status.success(),
                "task process exited"
            );

            Ok(if status.success() {
                TaskOutcome::Success
            } else {
                TaskOutcome::Failed(code)
            })
        }

        stop = &mut stop_rx => {
            if stop.is_ok() {
                info!(task = %task.id, "stop requested; killing process");
            }
            if let Err(e) = child.kill().await {
                warn!(task = %task.id, error = %e, "failed to kill child process");
            }
            Ok(TaskOutcome::Failed(NO_EXIT_CODE))
        }
    }
}

fn forward_lines<R>(task: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task, stream, "{}", line);
        }
    });
}
