// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Load a plan file from a given path and return the raw `RawPlanFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Parse plan TOML held in memory.
pub fn parse_str(contents: &str) -> Result<RawPlanFile> {
    let plan: RawPlanFile = toml::from_str(contents)?;
    Ok(plan)
}

/// Load a plan file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown or self-referencing `after` entries,
///   - DAG cycles,
///   - malformed durations and global settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let plan = PlanFile::try_from(raw)?;
    debug!(path = %path.display(), tasks = plan.task.len(), "plan loaded");
    Ok(plan)
}

/// Default plan location: `Taskorch.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskorch.toml")
}
