//! Signal-driven message pump.
//!
//! The pump owns one background worker that waits on a [`WaitableSignal`]
//! with a bounded timeout; on each signal it invokes a caller-supplied
//! delivery handler, then loops until cancelled. The timeout branch is a
//! poll-for-cancellation escape, not an error.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::sync::{WaitOutcome, WaitableSignal, lock};

/// Bounded wait per loop iteration; long enough to stay off the hot path,
/// short enough that cancellation is observed promptly.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`SignalPump::shutdown`] waits for the worker to exit before
/// abandoning it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery handler invoked once per observed signal.
///
/// Errors returned by the handler are logged and swallowed; a misbehaving
/// handler never kills the pump.
pub type PumpHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Background worker that turns an external "data ready" signal into
/// delivery calls.
///
/// Each [`start`](Self::start) creates a fresh signal/cancellation pair;
/// neither is ever reused across starts.
pub struct SignalPump {
    signal: Mutex<Arc<WaitableSignal>>,
    cancel: Mutex<CancellationToken>,
    kill: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SignalPump {
    pub fn new() -> Self {
        Self {
            signal: Mutex::new(Arc::new(WaitableSignal::new())),
            cancel: Mutex::new(CancellationToken::new()),
            kill: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Start the pump worker with the given delivery handler.
    ///
    /// Returns `false` if a worker is already running or if no runtime is
    /// available to schedule it. Prior cancellation and kill state is reset
    /// before the worker starts.
    pub fn start(&self, handler: PumpHandler) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug_assert!(false, "SignalPump::start called outside a tokio runtime");
            error!("signal pump needs a tokio runtime to schedule its worker");
            return false;
        };

        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            warn!("signal pump already running; start refused");
            return false;
        }

        self.kill.store(false, Ordering::Release);
        let signal = Arc::new(WaitableSignal::new());
        let cancel = CancellationToken::new();
        *lock(&self.signal) = Arc::clone(&signal);
        *lock(&self.cancel) = cancel.clone();

        let kill = Arc::clone(&self.kill);
        *worker = Some(runtime.spawn(Self::run(signal, cancel, kill, handler)));
        debug!("signal pump started");
        true
    }

    /// The signal the current worker is waiting on.
    ///
    /// Hand this to the transport so it can flag inbound data. Replaced by
    /// every [`start`](Self::start).
    pub fn signal(&self) -> Arc<WaitableSignal> {
        Arc::clone(&lock(&self.signal))
    }

    /// Request cooperative stop.
    ///
    /// Cancels the worker's token and raises the raw kill flag as a
    /// fallback; the worker observes one of the two within a wait-timeout
    /// period. Does not wait for the worker to exit.
    pub fn cancel(&self) {
        self.kill.store(true, Ordering::Release);
        lock(&self.cancel).cancel();
    }

    /// Cancel and await worker termination, bounded by [`JOIN_TIMEOUT`].
    ///
    /// Returns `true` if the worker exited in time. A worker that does not
    /// is abandoned, not joined, so shutdown never hangs on a stuck handler.
    pub async fn shutdown(&self) -> bool {
        self.cancel();
        let worker = lock(&self.worker).take();
        let Some(worker) = worker else {
            return true;
        };
        match tokio::time::timeout(JOIN_TIMEOUT, worker).await {
            Ok(_) => {
                debug!("signal pump worker joined");
                true
            }
            Err(_) => {
                error!(timeout = ?JOIN_TIMEOUT, "signal pump worker did not exit; abandoning it");
                false
            }
        }
    }

    /// Whether a worker is currently alive.
    pub fn is_running(&self) -> bool {
        lock(&self.worker).as_ref().is_some_and(|w| !w.is_finished())
    }

    async fn run(
        signal: Arc<WaitableSignal>,
        cancel: CancellationToken,
        kill: Arc<AtomicBool>,
        handler: PumpHandler,
    ) {
        debug!("signal pump worker running");
        loop {
            if kill.load(Ordering::Acquire) {
                debug!("kill flag observed; pump worker exiting");
                break;
            }
            match signal.wait(WAIT_TIMEOUT, &cancel).await {
                Ok(WaitOutcome::Signaled) => {
                    signal.reset();
                    let delivery = std::panic::AssertUnwindSafe(handler()).catch_unwind();
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => None,
                        result = delivery => Some(result),
                    };
                    match outcome {
                        None => {
                            debug!("pump cancelled during delivery; worker exiting");
                            break;
                        }
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err(e))) => {
                            warn!(error = %e, "delivery handler failed; pump continues")
                        }
                        Some(Err(_)) => {
                            error!("delivery handler panicked; pump continues")
                        }
                    }
                    signal.reset();
                }
                Ok(WaitOutcome::TimedOut) => continue,
                Err(_) => {
                    debug!("pump worker cancelled while waiting");
                    break;
                }
            }
        }
        debug!("signal pump worker exited");
    }
}

impl Default for SignalPump {
    fn default() -> Self {
        Self::new()
    }
}
