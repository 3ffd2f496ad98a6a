// src/dag/mod.rs

//! Dependency graph and readiness.
//!
//! - [`graph`] holds the directed dependency graph of task IDs.
//! - [`analysis`] adds batch analyses: topological order, cycle detection,
//!   critical path and parallel levels.
//! - [`readiness`] derives per-task readiness from completion/failure state.
//! - [`task_info`] provides the readiness record types and the external
//!   blocking hook.

pub mod analysis;
pub mod graph;
pub mod readiness;
pub mod task_info;

pub use graph::DependencyGraph;
pub use readiness::ReadinessCalculator;
pub use task_info::{BlockingSource, ReadinessState, TaskReadiness};
