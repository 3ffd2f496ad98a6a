// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::DependencyGraph;
use crate::verify::{AcceptanceCriterion, RouterOptions};

/// Raw plan as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_parallel = 2
///
/// [verification]
/// stability_window = "2s"
/// max_retries = 2
/// test_cmd = "cargo test"
///
/// [task.schema]
/// cmd = "./gen-schema.sh"
/// artifacts = ["schema/api.json"]
///
/// [task.api]
/// cmd = "./build-api.sh"
/// after = ["schema"]
/// priority = 10
///
/// [[task.api.acceptance]]
/// id = "handlers"
/// patterns = ["src/api/**/*.rs"]
/// ```
///
/// All sections are optional and have reasonable defaults; validation
/// rejects a plan without tasks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlanFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub verification: VerificationSection,

    /// All tasks from `[task.<id>]`, keyed by task ID.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated plan. Construct via `PlanFile::try_from(RawPlanFile)`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub config: ConfigSection,
    pub verification: VerificationSettings,
    pub task: BTreeMap<String, TaskConfig>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        verification: VerificationSettings,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            verification,
            task,
        }
    }

    /// Dependency graph of the plan, tasks in key order.
    pub fn graph(&self) -> DependencyGraph {
        task_graph(&self.task)
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            stability_window: self.verification.stability_window,
            max_retries: self.verification.max_retries,
            full_suite: self.verification.full_suite,
            collect_coverage: self.verification.collect_coverage,
        }
    }
}

pub(crate) fn task_graph(tasks: &BTreeMap<String, TaskConfig>) -> DependencyGraph {
    DependencyGraph::from_edges(
        tasks
            .iter()
            .map(|(id, task)| (id.as_str(), task.after.iter().map(String::as_str))),
    )
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks executing at once.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

/// `[verification]` section, as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationSection {
    /// Duration string such as `"2s"` or `"500ms"`.
    #[serde(default = "default_stability_window")]
    pub stability_window: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Run the full suite for every task.
    #[serde(default)]
    pub full_suite: bool,

    #[serde(default)]
    pub collect_coverage: bool,

    /// Shell command run for each verification. Without it only acceptance
    /// criteria are checked.
    #[serde(default)]
    pub test_cmd: Option<String>,

    /// Shell command used instead of `test_cmd` for full-suite runs.
    #[serde(default)]
    pub full_suite_cmd: Option<String>,
}

fn default_stability_window() -> String {
    "2s".to_string()
}

fn default_max_retries() -> u32 {
    2
}

impl Default for VerificationSection {
    fn default() -> Self {
        Self {
            stability_window: default_stability_window(),
            max_retries: default_max_retries(),
            full_suite: false,
            collect_coverage: false,
            test_cmd: None,
            full_suite_cmd: None,
        }
    }
}

/// Validated `[verification]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSettings {
    pub stability_window: Duration,
    pub max_retries: u32,
    pub full_suite: bool,
    pub collect_coverage: bool,
    pub test_cmd: Option<String>,
    pub full_suite_cmd: Option<String>,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command doing the work. A task without one completes as soon as
    /// it is dispatched.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Higher runs first among ready tasks.
    #[serde(default)]
    pub priority: i32,

    /// Files the task produces; submitted to verification as changed files.
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Request the full test suite when verifying this task.
    #[serde(default)]
    pub full_suite: bool,

    #[serde(default)]
    pub acceptance: Vec<AcceptanceCriterion>,
}
