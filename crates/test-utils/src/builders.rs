#![allow(dead_code)]

use std::collections::BTreeMap;

use taskorch::config::{ConfigSection, PlanFile, RawPlanFile, TaskConfig, VerificationSection};
use taskorch::verify::AcceptanceCriterion;

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                config: ConfigSection::default(),
                verification: VerificationSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, id: &str, task: TaskConfig) -> Self {
        self.plan.task.insert(id.to_string(), task);
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.plan.config.max_parallel = n;
        self
    }

    pub fn stability_window(mut self, window: &str) -> Self {
        self.plan.verification.stability_window = window.to_string();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.plan.verification.max_retries = n;
        self
    }

    pub fn test_cmd(mut self, cmd: &str) -> Self {
        self.plan.verification.test_cmd = Some(cmd.to_string());
        self
    }

    pub fn raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.cmd = Some(cmd.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn artifact(mut self, path: &str) -> Self {
        self.task.artifacts.push(path.to_string());
        self
    }

    pub fn full_suite(mut self, val: bool) -> Self {
        self.task.full_suite = val;
        self
    }

    pub fn acceptance(mut self, id: &str, patterns: &[&str]) -> Self {
        self.task.acceptance.push(AcceptanceCriterion {
            id: id.to_string(),
            description: String::new(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
