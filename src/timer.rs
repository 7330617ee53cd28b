// MIT License - Copyright (c) 2026 Peter Wright
// One-shot timers with single-slot replacement

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled one-shot callback.
///
/// Cancelling only stops a timer that is still waiting. Once the callback has
/// started it runs to completion, and cancelling is a no-op. The handle
/// reports done after a cancel or once the callback has returned.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run `callback` on the tokio runtime after `delay`, unless cancelled first.
pub fn schedule_once<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let waiter = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = waiter.cancelled() => return,
            _ = sleep(delay) => {}
        }
        callback.await;
        waiter.cancel();
    });
    TimerHandle { token }
}

/// Holds at most one outstanding timer of a given kind.
#[derive(Debug, Default)]
pub struct TimerSlot {
    current: Option<TimerHandle>,
}

impl TimerSlot {
    /// Cancel the previous timer, if any, and schedule a new one in its place.
    pub fn replace<F>(&mut self, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.current = Some(schedule_once(delay, callback));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.cancel();
        }
    }

    /// True while the timer is waiting or its callback is still running.
    pub fn is_scheduled(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_done())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
