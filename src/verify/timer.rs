// src/verify/timer.rs

//! Cancellable one-shot timers on the tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a callback scheduled with [`schedule`].
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the timer. A callback that has not started yet never runs.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the callback ran or the timer was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `callback` once after `delay`, unless cancelled first.
///
/// Must be called from within a tokio runtime.
pub fn schedule<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !flag.load(Ordering::SeqCst) {
            callback();
        }
    });

    TimerHandle { cancelled, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fires_after_delay() {
        let (tx, rx) = oneshot::channel();
        let _handle = schedule(Duration::from_millis(10), move || {
            let _ = tx.send(());
        });

        let fired = timeout(Duration::from_secs(2), rx).await;
        assert!(matches!(fired, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, rx) = oneshot::channel::<()>();
        let handle = schedule(Duration::from_millis(20), move || {
            let _ = tx.send(());
        });
        handle.cancel();
        assert!(handle.is_cancelled());

        // The callback (and its sender) is dropped without running.
        let res = timeout(Duration::from_secs(2), rx).await;
        assert!(matches!(res, Ok(Err(_))));
    }
}
