// src/logging.rs

//! Logging setup for `taskorch` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. the `--log-level` CLI flag;
//! 2. the `TASKORCH_LOG` environment variable, which accepts full
//!    `EnvFilter` directives (`info,taskorch::verify=debug`);
//! 3. `info`.
//!
//! Logs go to STDERR; stdout carries the dry-run report and the summary.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TASKORCH_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let directive = resolve_directive(cli_level, env_value.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    Ok(())
}

fn resolve_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level_directive(level).to_string();
    }
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty() && EnvFilter::try_new(v).is_ok())
        .map_or_else(|| DEFAULT_DIRECTIVE.to_string(), str::to_string)
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_wins_over_env() {
        assert_eq!(resolve_directive(Some(LogLevel::Warn), Some("trace")), "warn");
    }

    #[test]
    fn env_directives_pass_through() {
        assert_eq!(resolve_directive(None, Some(" debug ")), "debug");
        assert_eq!(
            resolve_directive(None, Some("info,taskorch::verify=debug")),
            "info,taskorch::verify=debug"
        );
    }

    #[test]
    fn falls_back_to_info() {
        assert_eq!(resolve_directive(None, Some("")), "info");
        assert_eq!(resolve_directive(None, Some("taskorch=loud")), "info");
        assert_eq!(resolve_directive(None, None), "info");
    }
}
