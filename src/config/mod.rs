// src/config/mod.rs

//! Plan file loading and validation for taskorch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate basic invariants like DAG correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigSection, PlanFile, RawPlanFile, TaskConfig, VerificationSection, VerificationSettings,
};
pub use validate::parse_duration;
