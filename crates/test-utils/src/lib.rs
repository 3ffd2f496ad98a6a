//! Shared fixtures for taskorch tests: plan builders, a fake executor and a
//! scripted test runner.

pub mod builders;
pub mod fake_executor;
pub mod fake_test_runner;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for any single async test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured by the harness and shown only for failing tests (or
/// with `--nocapture`). The filter is read from `TASKORCH_LOG`, defaulting
/// to `info`, e.g. `TASKORCH_LOG=taskorch::verify=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("TASKORCH_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {TEST_TIMEOUT:?}"),
    }
}
