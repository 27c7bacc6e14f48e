//! Manually-resettable signal with async wait semantics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SimlinkError};

/// Outcome of waiting on a [`WaitableSignal`].
///
/// Cancellation is not an outcome: a cancelled wait surfaces as
/// [`SimlinkError::Cancelled`] so callers cannot mistake it for a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// A boolean, manually-resettable signal with async-await semantics.
///
/// `set()` is idempotent and may be called from any thread; waiters suspend
/// cooperatively and resume on signal, timeout, or cancellation, whichever
/// occurs first. Waiter registration is scoped to the wait future, so no
/// registration outlives a wait on any exit path.
#[derive(Debug, Default)]
pub struct WaitableSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl WaitableSignal {
    /// Create a new signal in the unsignaled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new signal that starts out signaled.
    pub fn new_set() -> Self {
        Self { flag: AtomicBool::new(true), notify: Notify::new() }
    }

    /// Signal the event, waking all current waiters. Idempotent.
    pub fn set(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Clear the signal.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether the signal is currently set.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Atomically consume the signal if it is set.
    ///
    /// Returns `true` iff this call observed the signal set and cleared it.
    /// This is the acquisition primitive for [`super::HandleGate`].
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    /// Wait until the signal is set, the timeout elapses, or the token is
    /// cancelled.
    ///
    /// Returns `Ok(WaitOutcome::Signaled)` if signaled before the deadline,
    /// `Ok(WaitOutcome::TimedOut)` on timeout, and `Err(Cancelled)` if the
    /// token fired first. The signal is not consumed; callers that want
    /// one-shot semantics must `reset()` it themselves.
    pub async fn wait(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register as a waiter before the flag check so a concurrent
            // set() cannot slip between the check and the suspension.
            notified.as_mut().enable();
            if self.is_set() {
                return Ok(WaitOutcome::Signaled);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(SimlinkError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(WaitOutcome::TimedOut),
                _ = &mut notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_set() {
        let signal = WaitableSignal::new_set();
        let cancel = CancellationToken::new();
        let outcome = signal.wait(Duration::from_secs(1), &cancel).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Signaled);
        // Not consumed by the wait.
        assert!(signal.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_when_never_set() {
        let signal = WaitableSignal::new();
        let cancel = CancellationToken::new();
        let outcome = signal.wait(Duration::from_secs(5), &cancel).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn set_from_another_task_wakes_waiter() {
        let signal = Arc::new(WaitableSignal::new());
        let cancel = CancellationToken::new();

        let waiter = {
            let signal = Arc::clone(&signal);
            let cancel = cancel.clone();
            tokio::spawn(async move { signal.wait(Duration::from_secs(10), &cancel).await })
        };

        tokio::task::yield_now().await;
        signal.set();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome, WaitOutcome::Signaled);
    }

    #[tokio::test]
    async fn cancellation_is_a_distinct_outcome() {
        let signal = Arc::new(WaitableSignal::new());
        let cancel = CancellationToken::new();

        let waiter = {
            let signal = Arc::clone(&signal);
            let cancel = cancel.clone();
            tokio::spawn(async move { signal.wait(Duration::from_secs(60), &cancel).await })
        };

        tokio::task::yield_now().await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(SimlinkError::Cancelled)));
    }

    #[tokio::test]
    async fn reset_clears_the_signal() {
        let signal = WaitableSignal::new();
        signal.set();
        assert!(signal.is_set());
        signal.reset();
        assert!(!signal.is_set());

        let cancel = CancellationToken::new();
        let outcome = signal.wait(Duration::from_millis(10), &cancel).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn take_consumes_exactly_once() {
        let signal = WaitableSignal::new_set();
        assert!(signal.take());
        assert!(!signal.take());
        assert!(!signal.is_set());
    }

    #[tokio::test]
    async fn set_is_idempotent() {
        let signal = WaitableSignal::new();
        signal.set();
        signal.set();
        assert!(signal.take());
        assert!(!signal.take());
    }
}
