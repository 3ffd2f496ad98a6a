// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands defined in
//! the plan, using `tokio::process::Command`, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main executor loop which manages task processes.
//! - [`task_runner`] handles individual task process execution.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `CommandExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{CommandExecutorBackend, ExecutorBackend};
pub use executor_loop::spawn_executor;
