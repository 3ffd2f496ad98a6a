// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod verify;

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PlanFile;
use crate::engine::{Orchestrator, Runtime, RuntimeEvent, RuntimeOptions, TaskStatus};
use crate::exec::CommandExecutorBackend;
use crate::verify::{CommandTestRunner, VerificationRouter};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading and validation
/// - orchestrator / verification router / runtime
/// - executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = PathBuf::from(&args.plan);
    let mut plan = load_and_validate(&plan_path)?;

    if let Some(n) = args.max_parallel {
        plan.config.max_parallel = usize::from(n);
    }

    if args.dry_run {
        print!("{}", render_dry_run(&plan));
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = CommandExecutorBackend::new(rt_tx.clone());
    let router = build_router(&plan);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let options = RuntimeOptions {
        max_parallel: plan.config.max_parallel,
        exit_when_idle: true,
    };
    let core = Orchestrator::from_plan(&plan, options);
    info!(
        tasks = plan.task.len(),
        max_parallel = options.max_parallel,
        "plan loaded; starting"
    );

    let runtime = Runtime::new(core, rt_rx, executor, router);
    let core = runtime.run().await?;

    let summary = core.status().summary();
    println!("{}", render_summary(&summary));

    let failed = summary.get(&TaskStatus::Failed).copied().unwrap_or(0);
    if failed > 0 {
        bail!("{failed} task(s) failed");
    }
    Ok(())
}

/// Router configured from the plan's `[verification]` section.
pub fn build_router(plan: &PlanFile) -> VerificationRouter {
    let router = VerificationRouter::new(plan.router_options());
    match &plan.verification.test_cmd {
        Some(cmd) => router.with_test_runner(CommandTestRunner::new(
            cmd.clone(),
            plan.verification.full_suite_cmd.clone(),
        )),
        None => router,
    }
}

/// Dry-run report: execution order, parallel levels, critical path and cycles.
pub fn render_dry_run(plan: &PlanFile) -> String {
    let graph = plan.graph();
    let mut out = String::new();

    let _ = writeln!(out, "taskorch dry-run");
    let _ = writeln!(out, "  config.max_parallel = {}", plan.config.max_parallel);
    let _ = writeln!(
        out,
        "  verification.stability_window = {:?}",
        plan.verification.stability_window
    );
    let _ = writeln!(
        out,
        "  verification.max_retries = {}",
        plan.verification.max_retries
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "tasks ({}):", plan.task.len());
    for (id, task) in plan.task.iter() {
        let _ = writeln!(out, "  - {id} (priority {})", task.priority);
        if let Some(cmd) = &task.cmd {
            let _ = writeln!(out, "      cmd: {cmd}");
        }
        if !task.after.is_empty() {
            let _ = writeln!(out, "      after: {:?}", task.after);
        }
        if !task.artifacts.is_empty() {
            let _ = writeln!(out, "      artifacts: {:?}", task.artifacts);
        }
        for criterion in &task.acceptance {
            let _ = writeln!(
                out,
                "      acceptance {}: {:?}",
                criterion.id, criterion.patterns
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "order: {}", graph.topological_sort().join(", "));
    let _ = writeln!(out, "levels:");
    for (depth, level) in graph.parallel_levels().iter().enumerate() {
        let _ = writeln!(out, "  {depth}: {}", level.join(", "));
    }
    let _ = writeln!(out, "critical path: {}", graph.critical_path().join(" -> "));

    let cycles = graph.detect_circular_dependencies();
    if cycles.is_empty() {
        let _ = writeln!(out, "cycles: none");
    } else {
        let _ = writeln!(out, "cycles:");
        for cycle in cycles {
            let _ = writeln!(out, "  {}", cycle.join(" -> "));
        }
    }

    out
}

fn render_summary(summary: &std::collections::BTreeMap<TaskStatus, usize>) -> String {
    let parts: Vec<String> = summary
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(status, count)| format!("{status}: {count}"))
        .collect();
    format!("taskorch finished ({})", parts.join(", "))
}
