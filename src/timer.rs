//! Cancellable one-shot and interval timers on top of tokio tasks.

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Handle to a scheduled task. Dropping the handle does NOT cancel the
/// task; callers cancel explicitly (war timers outlive their scope).
#[derive(Debug)]
pub struct TimerHandle {
    inner: tokio::task::AbortHandle,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Run `fut` once after `delay`.
pub fn after<F>(delay: Duration, fut: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fut.await;
    });
    TimerHandle {
        inner: task.abort_handle(),
    }
}

/// Run `make_fut` every `period`, starting one period from now.
pub fn every<M, F>(period: Duration, mut make_fut: M) -> TimerHandle
where
    M: FnMut() -> F + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately on the first tick; skip it so the
        // first sweep happens one period after startup.
        tick.tick().await;
        loop {
            tick.tick().await;
            make_fut().await;
        }
    });
    TimerHandle {
        inner: task.abort_handle(),
    }
}
