// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{PlanFile, RawPlanFile, VerificationSettings, task_graph};
use crate::errors::{Result, TaskorchError};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = TaskorchError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        let verification = validate_verification(&raw)?;
        Ok(PlanFile::new_unchecked(raw.config, verification, raw.task))
    }
}

fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_global_config(plan)?;
    validate_task_dependencies(plan)?;
    validate_acceptance(plan)?;
    validate_dag(plan)?;
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(TaskorchError::ConfigError(
            "plan must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(plan: &RawPlanFile) -> Result<()> {
    if plan.config.max_parallel == 0 {
        return Err(TaskorchError::ConfigError(
            "[config].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(plan: &RawPlanFile) -> Result<()> {
    for (id, task) in plan.task.iter() {
        for dep in task.after.iter() {
            if dep == id {
                return Err(TaskorchError::ConfigError(format!(
                    "task '{id}' cannot depend on itself in `after`"
                )));
            }
            if !plan.task.contains_key(dep) {
                return Err(TaskorchError::ConfigError(format!(
                    "task '{id}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_acceptance(plan: &RawPlanFile) -> Result<()> {
    for (id, task) in plan.task.iter() {
        let mut seen = std::collections::HashSet::new();
        for criterion in &task.acceptance {
            if criterion.id.trim().is_empty() {
                return Err(TaskorchError::ConfigError(format!(
                    "task '{id}' has an acceptance criterion without an id"
                )));
            }
            if !seen.insert(criterion.id.as_str()) {
                return Err(TaskorchError::ConfigError(format!(
                    "task '{id}' has duplicate acceptance criterion '{}'",
                    criterion.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(plan: &RawPlanFile) -> Result<()> {
    let graph = task_graph(&plan.task);
    let cycles = graph.detect_circular_dependencies();

    match cycles.first() {
        None => Ok(()),
        Some(cycle) => Err(TaskorchError::DagCycle(format!(
            "cycle detected in task DAG: {}",
            cycle.join(" -> ")
        ))),
    }
}

fn validate_verification(plan: &RawPlanFile) -> Result<VerificationSettings> {
    let section = &plan.verification;
    let stability_window = parse_duration(&section.stability_window).map_err(|e| {
        TaskorchError::ConfigError(format!("[verification].stability_window: {e}"))
    })?;

    Ok(VerificationSettings {
        stability_window,
        max_retries: section.max_retries,
        full_suite: section.full_suite,
        collect_coverage: section.collect_coverage,
        test_cmd: section.test_cmd.clone(),
        full_suite_cmd: section.full_suite_cmd.clone(),
    })
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
