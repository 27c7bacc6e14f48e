//! Connection state and lifecycle events.

use serde::Serialize;

/// The lifecycle state machine's states.
///
/// Exactly one state is current at any instant. External observers should
/// prefer [`crate::ConnectionManager::is_connected`] and the lifecycle
/// events over matching on states directly; intermediate states can change
/// between any two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// Pacer running, no session; every tick attempts a connection.
    Idle,
    /// Session opened, waiting for the simulator's open confirmation.
    Connecting,
    /// Open confirmed; the grace-period countdown is running.
    Connected,
    /// Steady state; the session is usable.
    ConfirmedConnection,
    /// The simulator quit or an attempt failed; the pacer will retry.
    ConnectionClosed,
    /// No pacer, no session. The initial state, re-entered by
    /// [`crate::ConnectionManager::disconnect`].
    Disconnected,
}

/// Lifecycle notifications, broadcast to any number of subscribers.
///
/// Each carries no payload beyond the firing instant; observers that need
/// the session handle re-fetch it through
/// [`crate::ConnectionManager::channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A session was opened and awaits confirmation. Fired exactly once per
    /// successful low-level connect.
    Establishing,
    /// The connection was confirmed. Fired exactly once per transition into
    /// [`ConnectionState::ConfirmedConnection`].
    Connected,
    /// The connection was torn down, by request or by the simulator
    /// quitting. Published before the session handle is disposed.
    Disconnected,
}
