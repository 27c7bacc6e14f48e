//! Connection manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lower clamp for the pacer interval, in seconds.
pub const MIN_PACE_SECS: u64 = 2;
/// Upper clamp for the pacer interval, in seconds.
pub const MAX_PACE_SECS: u64 = 20;
/// Default pacer interval, in seconds.
pub const DEFAULT_PACE_SECS: u64 = 5;

/// How inbound data reaches the lifecycle manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// The transport sets a data-ready signal and the manager's own pump
    /// worker performs delivery.
    #[default]
    SignalDriven,
    /// No pump is started; the host calls
    /// [`crate::ConnectionManager::deliver_pending`] from its own message
    /// loop.
    HostDriven,
}

/// Configuration for a [`crate::ConnectionManager`]. Immutable once the
/// manager is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Client name announced to the simulator on open.
    pub client_name: String,

    /// Pacer tick interval in seconds. Values outside
    /// [`MIN_PACE_SECS`]..=[`MAX_PACE_SECS`] are clamped silently.
    #[serde(default = "default_pace_secs")]
    pace_interval_secs: u64,

    /// Delivery transport selection.
    #[serde(default)]
    pub delivery: DeliveryMode,

    /// Index into the simulator's client configuration file.
    #[serde(default)]
    pub config_index: u32,
}

fn default_pace_secs() -> u64 {
    DEFAULT_PACE_SECS
}

impl LinkConfig {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            pace_interval_secs: DEFAULT_PACE_SECS,
            delivery: DeliveryMode::default(),
            config_index: 0,
        }
    }

    /// Parse a configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml)
            .map_err(|e| crate::error::SimlinkError::invalid_config(e.to_string()))
    }

    pub fn with_pace_interval_secs(mut self, secs: u64) -> Self {
        self.pace_interval_secs = secs;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// The effective pacer interval, clamped to the supported range.
    pub fn pace_interval(&self) -> Duration {
        Duration::from_secs(self.pace_interval_secs.clamp(MIN_PACE_SECS, MAX_PACE_SECS))
    }
}
