//! Managed connection lifecycle for SimConnect-style flight simulator APIs.
//!
//! Simlink keeps a session with an external flight-simulator process alive
//! for you: it establishes the connection, confirms it, monitors it, and
//! reconnects when the simulator disappears, without ever blocking the
//! caller's thread or letting a transport failure escape as a panic or an
//! error from the public surface.
//!
//! # Architecture
//!
//! - [`ConnectionManager`] owns the state machine and the session handle. A
//!   periodic pacer drives connection attempts and the confirmation grace
//!   period.
//! - [`SignalPump`] turns the transport's "data ready" signal into delivery
//!   calls on a background worker.
//! - [`HandleGate`] guarantees the pacer's connect/teardown path and the
//!   pump's delivery path never touch the session handle concurrently.
//! - [`SimGateway`] is the seam to the actual simulator API: implement it
//!   once per API generation and pick the implementation when constructing
//!   the manager.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use simlink::{ConnectionManager, LifecycleEvent, LinkConfig, SimGateway};
//!
//! # async fn run(gateway: Arc<dyn SimGateway>) {
//! let manager = ConnectionManager::new(gateway, LinkConfig::new("my-client"));
//! let mut events = manager.subscribe();
//!
//! assert!(manager.connect());
//! while let Ok(event) = events.recv().await {
//!     if event == LifecycleEvent::Connected {
//!         println!("simulator is up: {:?}", manager.detected_version());
//!         break;
//!     }
//! }
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod pump;
pub mod sync;

#[cfg(test)]
pub mod test_utils;

pub use config::{DeliveryMode, LinkConfig};
pub use connection::{ConnectionManager, ConnectionState, LifecycleEvent};
pub use error::{Result, SimlinkError};
pub use gateway::{ChannelEvent, SimChannel, SimGateway, SimMessage, SimVersion};
pub use ids::{CorrelationId, IdAllocator};
pub use pump::{PumpHandler, SignalPump};
pub use sync::{GateGuard, HandleGate, WaitOutcome, WaitableSignal};
