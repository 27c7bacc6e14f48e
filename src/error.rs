//! Error types for simulator connection management.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context. The lifecycle manager folds transient failures into state
//! transitions rather than letting them escape its public surface, so most
//! of these variants are only observed by gateway implementations and by
//! diagnostic log output.
//!
//! ## Recovery and Retry
//!
//! Errors can be classified for retry handling:
//!
//! ```rust
//! use simlink::SimlinkError;
//!
//! let error = SimlinkError::connection_failed("simulator not running");
//! if error.is_retryable() {
//!     println!("The pacer will retry this automatically");
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for simlink operations.
pub type Result<T, E = SimlinkError> = std::result::Result<T, E>;

/// Main error type for simulator connection operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SimlinkError {
    #[error("Failed to connect to simulator: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport error during {operation}")]
    Transport {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Wait was cancelled")]
    Cancelled,

    #[error("Handle gate acquisition timed out after {duration:?}")]
    GateTimeout { duration: Duration },

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },
}

impl SimlinkError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// The pacer uses the same classification implicitly: transient
    /// unavailability of the remote process is retried on every tick, while
    /// configuration and deadlock errors are surfaced and left alone.
    pub fn is_retryable(&self) -> bool {
        match self {
            SimlinkError::Connection { .. } => true,
            SimlinkError::Transport { .. } => true,
            SimlinkError::Timeout { .. } => true,
            SimlinkError::ChannelClosed => true,
            SimlinkError::Cancelled => false,
            SimlinkError::GateTimeout { .. } => false,
            SimlinkError::InvalidConfig { .. } => false,
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        SimlinkError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SimlinkError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for transport-level errors.
    pub fn transport(operation: impl Into<String>) -> Self {
        SimlinkError::Transport { operation: operation.into(), source: None }
    }

    /// Helper constructor for transport-level errors with source.
    pub fn transport_with_source(
        operation: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SimlinkError::Transport { operation: operation.into(), source: Some(source) }
    }

    /// Helper constructor for invalid configuration errors.
    pub fn invalid_config(details: impl Into<String>) -> Self {
        SimlinkError::InvalidConfig { details: details.into() }
    }
}
