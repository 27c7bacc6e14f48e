//! Binary gate serializing access to the simulator channel handle.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{Result, SimlinkError};

use super::signal::{WaitOutcome, WaitableSignal};

/// Default acquisition bound. Exceeding it is treated as a likely deadlock
/// between the pacer and the pump, not as a condition to retry.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// A binary gate guaranteeing the channel handle is never touched
/// concurrently by the pacer's connect/teardown path and the pump's delivery
/// path.
///
/// The gate is open (signaled) while the handle is free to use. Acquiring it
/// closes the gate and returns a [`GateGuard`]; dropping the guard reopens it
/// on every exit path, including panics.
#[derive(Debug)]
pub struct HandleGate {
    signal: WaitableSignal,
    // Never cancelled; gate waits end by acquisition or timeout only.
    cancel: CancellationToken,
}

impl HandleGate {
    /// Create a new gate in the open state.
    pub fn new() -> Self {
        Self { signal: WaitableSignal::new_set(), cancel: CancellationToken::new() }
    }

    /// Acquire the gate within the default bound.
    pub async fn acquire(&self) -> Result<GateGuard<'_>> {
        self.acquire_within(ACQUIRE_TIMEOUT).await
    }

    /// Acquire the gate, waiting at most `timeout`.
    ///
    /// A timeout is logged as an error and surfaced as
    /// [`SimlinkError::GateTimeout`]; the caller decides whether to proceed
    /// unguarded or abort. No automatic retry happens here, since retrying
    /// would only mask whatever is holding the gate.
    pub async fn acquire_within(&self, timeout: Duration) -> Result<GateGuard<'_>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.signal.take() {
                return Ok(GateGuard { gate: self });
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero()
                || self.signal.wait(remaining, &self.cancel).await? == WaitOutcome::TimedOut
            {
                error!(
                    timeout = ?timeout,
                    "handle gate acquisition timed out; possible deadlock between pacer and pump"
                );
                return Err(SimlinkError::GateTimeout { duration: timeout });
            }
        }
    }
}

impl Default for HandleGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`HandleGate::acquire`]; reopens the gate on drop.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a HandleGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.signal.set();
    }
}
