//! Session configuration.
//!
//! A [`SessionConfig`] describes how to reach a device and how the session
//! behaves once connected. Every field has a default, so a YAML file only
//! needs the keys it changes:
//!
//! ```yaml
//! transport:
//!   type: serial
//!   port: /dev/ttyUSB0
//!   baudrate: 115200
//! protocol: auto
//! updater:
//!   interval_ms: 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How to reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// A serial port.
    Serial {
        port: String,
        #[serde(default = "default_baudrate")]
        baudrate: u32,
    },
    /// A child process speaking the protocol on stdin/stdout.
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_baudrate() -> u32 {
    115_200
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: default_baudrate(),
        }
    }
}

/// Which communicator to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolSelection {
    /// Try the sonic protocol first, fall back to legacy.
    #[default]
    Auto,
    Sonic,
    Legacy,
}

/// Settings of the sonic communicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommunicatorConfig {
    /// Reply timeout when a contract has no estimated response time.
    pub default_timeout_ms: u64,
    /// Lower bound of every reply timeout.
    pub min_timeout_ms: u64,
    /// Bound of the raw message queue; the oldest message is dropped.
    pub message_queue_size: usize,
    /// Bound of the notification queue; the oldest notification is dropped.
    pub notify_queue_size: usize,
    /// Request ids wrap after this value.
    pub request_id_limit: u32,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        CommunicatorConfig {
            default_timeout_ms: 5000,
            min_timeout_ms: 200,
            message_queue_size: 100,
            notify_queue_size: 100,
            request_id_limit: i32::MAX as u32,
        }
    }
}

impl CommunicatorConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }
}

/// Settings of the legacy communicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LegacyConfig {
    /// Per-command timeout when the contract has no estimate.
    pub default_timeout_ms: u64,
    /// Quiet time that ends draining the boot banner.
    pub drain_timeout_ms: u64,
    /// Wait before draining, for slow-booting devices.
    pub startup_delay_ms: u64,
    pub message_queue_size: usize,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        LegacyConfig {
            default_timeout_ms: 400,
            drain_timeout_ms: 200,
            startup_delay_ms: 0,
            message_queue_size: 100,
        }
    }
}

impl LegacyConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Settings of the status updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Poll interval; 0 polls back to back.
    pub interval_ms: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        UpdaterConfig { interval_ms: 1000 }
    }
}

impl UpdaterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Complete session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub protocol: ProtocolSelection,
    pub communicator: CommunicatorConfig,
    pub legacy: LegacyConfig,
    pub updater: UpdaterConfig,
    /// Build the lookup table for release firmware.
    pub release: bool,
    /// Default log filter of the binary.
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            transport: TransportConfig::default(),
            protocol: ProtocolSelection::default(),
            communicator: CommunicatorConfig::default(),
            legacy: LegacyConfig::default(),
            updater: UpdaterConfig::default(),
            release: true,
            log_level: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        SessionConfig::from_yaml_str(&text)
    }

    /// Serialize the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
