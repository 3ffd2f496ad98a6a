// tests/command_backend.rs
#![cfg(unix)]

mod common;
use crate::common::{PlanFileBuilder, TaskConfigBuilder, init_tracing, with_timeout};

use std::time::Duration;

use tokio::sync::mpsc;

use taskorch::build_router;
use taskorch::engine::{Orchestrator, Runtime, RuntimeEvent, RuntimeOptions, TaskStatus};
use taskorch::exec::CommandExecutorBackend;

fn options(max_parallel: usize) -> RuntimeOptions {
    RuntimeOptions {
        max_parallel,
        exit_when_idle: true,
    }
}

#[tokio::test]
async fn shell_tasks_run_and_report_exit_codes() {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .stability_window("5ms")
        .test_cmd("true")
        .with_task(
            "build",
            TaskConfigBuilder::new()
                .cmd("echo building")
                .artifact("target/out.bin")
                .acceptance("binary", &["target/*.bin"])
                .build(),
        )
        .with_task(
            "publish",
            TaskConfigBuilder::new().cmd("exit 3").after("build").build(),
        )
        .with_task(
            "announce",
            TaskConfigBuilder::new().cmd("true").after("publish").build(),
        )
        .build();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = CommandExecutorBackend::new(tx.clone());
    let core = Orchestrator::from_plan(&plan, options(2));

    let core = with_timeout(Runtime::new(core, rx, executor, build_router(&plan)).run())
        .await
        .expect("runtime failed");

    let status = core.status();
    assert_eq!(status.status_of("build"), Some(TaskStatus::Done));
    assert_eq!(status.status_of("publish"), Some(TaskStatus::Failed));
    assert_eq!(status.status_of("announce"), Some(TaskStatus::Blocked));

    let exit_code = status
        .history("publish")
        .last()
        .and_then(|h| h.metadata.get("exit_code").cloned());
    assert_eq!(exit_code.as_deref(), Some("3"));
}

#[tokio::test]
async fn cancelling_a_running_task_stops_its_process() {
    init_tracing();

    let plan = PlanFileBuilder::new()
        .stability_window("5ms")
        .with_task("slow", TaskConfigBuilder::new().cmd("sleep 30").build())
        .build();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = CommandExecutorBackend::new(tx.clone());
    let core = Orchestrator::from_plan(&plan, options(1));

    {
        let tx = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx
                .send(RuntimeEvent::CancelTask {
                    task: "slow".to_string(),
                    reason: "operator abort".to_string(),
                })
                .await;
        });
    }

    let core = with_timeout(Runtime::new(core, rx, executor, build_router(&plan)).run())
        .await
        .expect("runtime failed");

    assert_eq!(core.status().status_of("slow"), Some(TaskStatus::Cancelled));
    assert_eq!(core.executing_count(), 0);
    let reason = core
        .status()
        .history("slow")
        .last()
        .and_then(|h| h.metadata.get("reason").cloned());
    assert_eq!(reason.as_deref(), Some("operator abort"));
}
