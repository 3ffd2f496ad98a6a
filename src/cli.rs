// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskorch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskorch",
    version,
    about = "Run a plan of dependent tasks with priority dispatch and verification.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Taskorch.toml")]
    pub plan: String,

    /// Parse + validate, print order, levels, critical path and cycles, but
    /// don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKORCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override `[config].max_parallel` from the plan.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_parallel: Option<u16>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["taskorch"]).unwrap();
        assert_eq!(args.plan, "Taskorch.toml");
        assert!(!args.dry_run);
        assert!(args.max_parallel.is_none());
    }

    #[test]
    fn rejects_zero_parallelism() {
        assert!(CliArgs::try_parse_from(["taskorch", "--max-parallel", "0"]).is_err());
        let args = CliArgs::try_parse_from(["taskorch", "--max-parallel", "4"]).unwrap();
        assert_eq!(args.max_parallel, Some(4));
    }
}
