//! Link configuration loaded from YAML.
//!
//! Every key is optional; missing keys take their defaults.
//!
//! ```yaml
//! port: /dev/ttyUSB0
//! baud_rate: 115200
//! ack_timeout_ms: 1500
//! filter_protocol: legacy
//! auto_cycle:
//!   interval_secs: 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::framer::DEFAULT_MAX_LINE_LEN;
use crate::sequence::DEFAULT_MAX_SEQUENCE_SECS;
use crate::transport::{PortSettings, SUPPORTED_BAUD_RATES};
use crate::types::{FilterProtocol, GeoPosition};
use crate::{LinkError, Result};

/// Auto-cycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCycleConfig {
    /// Seconds between automatic filter changes
    pub interval_secs: u64,
}

impl Default for AutoCycleConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl AutoCycleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Configuration for a [`LinkSession`](crate::session::LinkSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    /// How long a filter change waits for the device's acknowledgement
    pub ack_timeout_ms: u64,
    /// Bound on a single line write
    pub write_timeout_ms: u64,
    /// Cap on the total duration of a timed sequence
    pub max_sequence_seconds: u64,
    /// Dialect used when the session picks the command family itself
    pub filter_protocol: FilterProtocol,
    /// Send `$TIMED_FILTER,<compact>` before running a sequence locally
    pub announce_timed_sequences: bool,
    /// Buffer size of the telemetry, notification and sequence event channels
    pub event_capacity: usize,
    /// Longest inbound line kept; longer lines are dropped and reported
    pub max_line_len: usize,
    /// Position reported for frames while no GPS source is attached
    pub default_position: GeoPosition,
    pub auto_cycle: AutoCycleConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            ack_timeout_ms: 1200,
            write_timeout_ms: 1000,
            max_sequence_seconds: DEFAULT_MAX_SEQUENCE_SECS,
            filter_protocol: FilterProtocol::default(),
            announce_timed_sequences: true,
            event_capacity: 256,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            default_position: GeoPosition::default(),
            auto_cycle: AutoCycleConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = if yaml.trim().is_empty() {
            LinkConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| LinkError::ConfigFile { path: path.to_path_buf(), source })?;
        let config = Self::from_yaml_str(&yaml)?;
        debug!("Loaded link configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(LinkError::config("port must not be empty"));
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(LinkError::config(format!(
                "baud_rate {} is not one of {:?}",
                self.baud_rate, SUPPORTED_BAUD_RATES
            )));
        }
        let positive = [
            ("ack_timeout_ms", self.ack_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("max_sequence_seconds", self.max_sequence_seconds),
            ("event_capacity", self.event_capacity as u64),
            ("max_line_len", self.max_line_len as u64),
            ("auto_cycle.interval_secs", self.auto_cycle.interval_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(LinkError::config(format!("{key} must be greater than zero")));
        }
        let GeoPosition { latitude, longitude } = self.default_position;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LinkError::config(format!(
                "default_position {latitude},{longitude} is outside valid coordinates"
            )));
        }
        Ok(())
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings::new(self.port.clone(), self.baud_rate)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn max_sequence_duration(&self) -> Duration {
        Duration::from_secs(self.max_sequence_seconds)
    }
}
