use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchConfig;
use crate::session::BroadcastSink;
use crate::transport::{EthernetConnector, SerialConnector};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Tunables for one board session. Every field falls back to its default
/// when missing from a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long an in-flight command waits for Status/Error
    pub ack_timeout_ms: u64,
    /// Consecutive timeouts before the board is declared unresponsive
    pub max_failures: u32,
    /// Liveness probe period
    pub heartbeat_interval_ms: u64,
    /// Inbound records longer than this are dropped
    pub max_record_len: usize,
    pub telnet_port: u16,
    pub serial_baud_rate: u32,
    /// Buffer of the broadcast data sink
    pub sink_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 3000,
            max_failures: 3,
            heartbeat_interval_ms: 5000,
            max_record_len: 64 * 1024,
            telnet_port: 9801,
            serial_baud_rate: 115200,
            sink_capacity: 256,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded session config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid { field: "ack_timeout_ms", reason: "must be positive".into() });
        }
        if self.max_failures == 0 {
            return Err(ConfigError::Invalid { field: "max_failures", reason: "must be positive".into() });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid { field: "heartbeat_interval_ms", reason: "must be positive".into() });
        }
        if self.sink_capacity == 0 {
            return Err(ConfigError::Invalid { field: "sink_capacity", reason: "must be positive".into() });
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            ack_timeout: self.ack_timeout(),
            max_failures: self.max_failures,
        }
    }

    pub fn ethernet_connector(&self, host: impl Into<String>) -> EthernetConnector {
        EthernetConnector::with_port(host, self.telnet_port)
    }

    pub fn serial_connector(&self, port_name: impl Into<String>) -> SerialConnector {
        SerialConnector::with_baud_rate(port_name, self.serial_baud_rate)
    }

    /// Data sink sized by `sink_capacity`.
    pub fn broadcast_sink(&self) -> BroadcastSink {
        BroadcastSink::new(self.sink_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connector;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = SessionConfig::from_json_str(r#"{ "ack_timeout_ms": 500 }"#).unwrap();
        assert_eq!(config.ack_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.telnet_port, 9801);
    }

    #[test]
    fn test_connectors_follow_config() {
        let config = SessionConfig::from_json_str(r#"{ "serial_baud_rate": 9600 }"#).unwrap();
        assert_eq!(config.serial_connector("/dev/ttyUSB0").port_name(), "/dev/ttyUSB0");
        assert_eq!(config.ethernet_connector("10.0.0.5").describe(), "10.0.0.5:9801");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = SessionConfig::from_json_str(r#"{ "ack_timeout_ms": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "ack_timeout_ms", .. })));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(SessionConfig::from_json_str("{ nope"), Err(ConfigError::Json(_))));
    }
}
