//! Main configuration types.
//!
//! This module provides the top-level [`TetherConfig`] struct.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tether_telemetry::logging::create_env_filter;

use crate::{ConfigError, LogFormat, LoggingSettings, MetricsSettings, ServerSettings, SocketSettings};

/// Complete Tether service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use tether_config::TetherConfig;
///
/// let config = TetherConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.socket.read_timeout_ms, 60_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerSettings,

    /// Per-connection WebSocket tunables.
    #[serde(default)]
    pub socket: SocketSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl TetherConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The server address or (enabled) metrics address is not a socket address
    /// - The log level is not a valid filter directive
    /// - The heartbeat interval is not shorter than the read timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "server.ws_path",
                "must start with '/'",
            ));
        }

        if self.metrics.enabled && self.metrics.addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "metrics.addr",
                format!("invalid socket address: {}", self.metrics.addr),
            ));
        }

        if let Err(e) = create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }

        let socket = self.socket.to_socket_config();
        if socket.heartbeat_interval >= socket.read_timeout {
            return Err(ConfigError::invalid_value(
                "socket.heartbeat_interval_ms",
                format!(
                    "must be shorter than the read timeout ({} ms)",
                    socket.read_timeout.as_millis()
                ),
            ));
        }

        Ok(())
    }

    /// Development preset: pretty debug logging.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config
    }

    /// Production preset: JSON logging at info, metrics exporter enabled.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.metrics.enabled = true;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TetherConfig::default().validate().is_ok());
        assert!(TetherConfig::development().validate().is_ok());
        assert!(TetherConfig::production().validate().is_ok());
    }

    #[test]
    fn test_invalid_http_addr() {
        let mut config = TetherConfig::default();
        config.server.http_addr = "not-an-address".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.http_addr"));
    }

    #[test]
    fn test_invalid_ws_path() {
        let mut config = TetherConfig::default();
        config.server.ws_path = "ws".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_addr_checked_only_when_enabled() {
        let mut config = TetherConfig::default();
        config.metrics.addr = "nowhere".to_string();
        assert!(config.validate().is_ok());

        config.metrics.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.addr"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = TetherConfig::default();
        config.logging.level = "tether_ws=loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_heartbeat_must_undercut_read_timeout() {
        let mut config = TetherConfig::default();
        config.socket.read_timeout_ms = 1_000;
        config.socket.heartbeat_interval_ms = Some(1_000);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval_ms"));

        config.socket.heartbeat_interval_ms = Some(999);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_preset() {
        let config = TetherConfig::development();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.metrics.enabled);
    }
}
