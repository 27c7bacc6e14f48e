//! Synchronization primitives shared by the pacer and the signal pump.

mod gate;
mod signal;

pub use gate::{GateGuard, HandleGate};
pub use signal::{WaitOutcome, WaitableSignal};

/// Lock a mutex, recovering the inner data if a previous holder panicked.
///
/// All guarded sections in this crate are short and non-awaiting, so a
/// poisoned lock only means a panic unwound through one of them; the data is
/// still structurally valid.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
