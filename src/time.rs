//! Time sources.
//!
//! The engine never reads an ambient clock. Everything that needs the current
//! instant or a future wake-up goes through an injected [`TimeSource`], so
//! expiry and pause timeouts can be driven by a virtual clock in tests.
//!
//! [`TokioTimeSource`] is backed by `tokio::time`, which means that under
//! `#[tokio::test(start_paused = true)]` it follows tokio's paused clock and
//! `tokio::time::advance` fires timers deterministically.

use crate::error::Result;
use futures::future::BoxFuture;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Callback run when a scheduled deadline is reached.
pub type TimerAction = Box<dyn FnOnce() + Send + 'static>;

/// Trait for time source implementations.
///
/// Implementors supply the current instant and a way to wait until a future
/// instant. Scheduling a one-shot callback is provided on top of those two and
/// spawns onto the current tokio runtime.
pub trait TimeSource: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Future that completes once `deadline` has been reached.
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;

    /// Run `action` once `deadline` has been reached.
    ///
    /// # Errors
    /// Returns `Error::SchedulerError` if no tokio runtime is available to
    /// drive the timer.
    fn schedule(&self, deadline: Instant, action: TimerAction) -> Result<TimerHandle> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let sleep = self.sleep_until(deadline);
        let task = runtime.spawn(async move {
            sleep.await;
            action();
        });
        Ok(TimerHandle::new(task.abort_handle()))
    }
}

/// Handle to a scheduled timer.
///
/// Dropping the handle does not cancel the timer; call [`TimerHandle::cancel`].
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn new(abort: AbortHandle) -> Self {
        TimerHandle { abort }
    }

    /// Cancel the timer. The action will not run unless it already started.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Time source backed by `tokio::time`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTimeSource;

impl TokioTimeSource {
    pub fn new() -> Self {
        TokioTimeSource
    }
}

impl TimeSource for TokioTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_at_deadline() {
        let clock = TokioTimeSource::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let deadline = clock.now() + Duration::from_secs(5);
        let _handle = clock
            .schedule(
                deadline,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("Failed to schedule");

        tokio::time::advance(Duration::from_millis(4_999)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let clock = TokioTimeSource::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let handle = clock
            .schedule(
                clock.now() + Duration::from_secs(1),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("Failed to schedule");
        handle.cancel();

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schedule_without_runtime_fails() {
        let clock = TokioTimeSource::new();
        let now = std::time::Instant::now().into();
        let result = clock.schedule(now, Box::new(|| {}));
        assert!(matches!(result, Err(Error::SchedulerError(_))));
    }
}
