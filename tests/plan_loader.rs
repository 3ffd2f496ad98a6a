// tests/plan_loader.rs

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use taskorch::config::{default_config_path, load_and_validate, load_from_path};
use taskorch::errors::TaskorchError;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn write_plan(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Taskorch.toml");
    fs::write(&path, contents).expect("write plan");
    path
}

#[test]
fn loads_full_plan_with_defaults() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(
        &dir,
        r#"
        [verification]
        stability_window = "750ms"
        test_cmd = "cargo test"

        [task.schema]
        cmd = "./gen-schema.sh"
        artifacts = ["schema/api.json"]

        [task.api]
        cmd = "./build-api.sh"
        after = ["schema"]
        priority = 10

        [[task.api.acceptance]]
        id = "handlers"
        description = "handlers compiled"
        patterns = ["src/api/**/*.rs"]
        "#,
    );

    let plan = load_and_validate(&path)?;

    assert_eq!(plan.config.max_parallel, 1);
    assert_eq!(plan.verification.stability_window, Duration::from_millis(750));
    assert_eq!(plan.verification.max_retries, 2);
    assert_eq!(plan.verification.test_cmd.as_deref(), Some("cargo test"));
    assert_eq!(plan.task["api"].priority, 10);
    assert_eq!(plan.task["api"].acceptance[0].id, "handlers");
    assert_eq!(plan.graph().topological_sort(), vec!["schema", "api"]);
    Ok(())
}

#[test]
fn rejects_dependency_cycle() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(
        &dir,
        r#"
        [task.a]
        after = ["c"]
        [task.b]
        after = ["a"]
        [task.c]
        after = ["b"]
        "#,
    );

    // Parsing alone succeeds; validation finds the cycle.
    assert_eq!(load_from_path(&path)?.task.len(), 3);
    match load_and_validate(&path) {
        Err(TaskorchError::DagCycle(msg)) => {
            for id in ["a", "b", "c"] {
                assert!(msg.contains(id), "cycle message {msg:?} should name {id}");
            }
        }
        other => panic!("expected cycle error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn rejects_unknown_dependency() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(
        &dir,
        r#"
        [task.a]
        after = ["ghost"]
        "#,
    );

    match load_and_validate(&path) {
        Err(TaskorchError::ConfigError(msg)) => assert!(msg.contains("ghost")),
        other => panic!("expected config error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn rejects_bad_stability_window() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(
        &dir,
        r#"
        [verification]
        stability_window = "soon"

        [task.a]
        cmd = "true"
        "#,
    );

    assert!(matches!(
        load_and_validate(&path),
        Err(TaskorchError::ConfigError(_))
    ));
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(&dir, "[task.a\ncmd = ");

    assert!(matches!(
        load_from_path(&path),
        Err(TaskorchError::TomlError(_))
    ));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = TempDir::new()?;
    let missing = dir.path().join("nope.toml");

    assert!(matches!(
        load_and_validate(&missing),
        Err(TaskorchError::IoError(_))
    ));
    Ok(())
}

#[test]
fn default_path_is_taskorch_toml() {
    assert_eq!(default_config_path(), std::path::PathBuf::from("Taskorch.toml"));
}
