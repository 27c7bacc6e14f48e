//! Gateway abstraction over the simulator's out-of-process message API.
//!
//! The simulator API itself is an opaque collaborator: it can appear,
//! disappear, or reject calls at any time. This module fixes the capability
//! surface the lifecycle manager needs from it and nothing more. Picking the
//! right implementation for a detected remote version happens at
//! construction time through a strategy object, not through runtime
//! reflection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sync::WaitableSignal;

/// Which generation of the remote message API was detected.
///
/// The two generations are wire-incompatible; version-specific struct
/// layouts and converters live in the gateway implementations, outside this
/// crate's core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimVersion {
    Fsx,
    Msfs,
}

/// An inbound message whose content the lifecycle forwards untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimMessage {
    /// Gateway-defined message discriminant.
    pub kind: u32,
    /// Raw payload; content semantics belong to the gateway and its callers.
    pub payload: Vec<u8>,
}

/// Typed inbound events delivered by [`SimChannel::receive`].
///
/// These replace the simulator API's registrable callback slots: each
/// callback becomes a variant the lifecycle dispatches, and having zero
/// listeners for any of them is always safe.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The simulator confirmed the open request.
    OpenConfirmed { app_name: String, app_version: String },
    /// The simulator is shutting down and force-closes the session.
    Quit,
    /// Anything else; forwarded to message subscribers.
    Message(SimMessage),
}

/// Version-selected strategy for reaching the simulator process.
#[async_trait]
pub trait SimGateway: Send + Sync {
    /// Probe whether a simulator process is currently reachable, and which
    /// API generation it speaks. Consulted once per connection attempt.
    async fn probe(&self) -> Option<SimVersion>;

    /// Open a session with the simulator.
    ///
    /// `data_ready`, when present, is the signal the transport must set
    /// whenever inbound data is pending; the signal pump waits on it. With
    /// the host-driven delivery mode no signal is supplied and the host
    /// polls via [`crate::ConnectionManager::deliver_pending`].
    ///
    /// Fails with a transport error when the remote process is absent or
    /// rejects the session.
    async fn open(
        &self,
        client_name: &str,
        data_ready: Option<Arc<WaitableSignal>>,
        config_index: u32,
    ) -> Result<Arc<dyn SimChannel>>;
}

/// A live session handle.
///
/// Exclusively owned by the lifecycle manager; callers see it only through
/// [`crate::ConnectionManager::channel`] and must tolerate it becoming
/// invalid at any time. Calls after [`close`](Self::close) return errors,
/// never undefined behavior.
pub trait SimChannel: Send + Sync {
    /// The API generation this session speaks.
    fn version(&self) -> SimVersion;

    /// Whether the session has not been closed yet. Advisory only; the
    /// remote process can vanish between this check and the next call.
    fn is_open(&self) -> bool;

    /// Pump one batch of pending inbound events. Bounded-time; returns an
    /// empty batch when nothing is pending.
    fn receive(&self) -> Result<Vec<ChannelEvent>>;

    /// Tear the session down. Idempotent; also drops any callback wiring
    /// the transport holds.
    fn close(&self);
}
