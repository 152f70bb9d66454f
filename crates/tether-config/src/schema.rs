//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_telemetry::{LogConfig, MetricsConfig};
use tether_ws::SocketConfig;

/// Server configuration section.
///
/// # Example
///
/// ```
/// use tether_config::ServerSettings;
///
/// let server = ServerSettings {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(server.ws_path, "/ws");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Request path that accepts WebSocket upgrades.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            ws_path: default_ws_path(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

/// Per-connection tunables, with durations in milliseconds.
///
/// Zero values fall back to the library defaults when the connection is
/// configured, except `write_timeout_ms` where zero disables write bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SocketSettings {
    /// Bound on each frame write.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Silence allowed before the connection is considered dead.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Heartbeat period. Unset derives it from the read timeout.
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,

    /// Largest inbound message accepted, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Send buffer depth.
    #[serde(default = "default_buffer_depth")]
    pub send_buffer_depth: usize,

    /// Receive buffer depth.
    #[serde(default = "default_buffer_depth")]
    pub receive_buffer_depth: usize,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            heartbeat_interval_ms: None,
            max_message_size: default_max_message_size(),
            send_buffer_depth: default_buffer_depth(),
            receive_buffer_depth: default_buffer_depth(),
        }
    }
}

impl SocketSettings {
    /// Convert into the connection configuration, applying the defaulting rule.
    pub fn to_socket_config(&self) -> SocketConfig {
        SocketConfig::new()
            .write_timeout(Duration::from_millis(self.write_timeout_ms))
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
            .heartbeat_interval(
                self.heartbeat_interval_ms
                    .map_or(Duration::ZERO, Duration::from_millis),
            )
            .max_message_size(self.max_message_size)
            .send_buffer_depth(self.send_buffer_depth)
            .receive_buffer_depth(self.receive_buffer_depth)
            .prepare()
    }
}

fn default_write_timeout_ms() -> u64 {
    millis(tether_ws::config::DEFAULT_WRITE_TIMEOUT)
}

fn default_read_timeout_ms() -> u64 {
    millis(tether_ws::config::DEFAULT_READ_TIMEOUT)
}

fn default_max_message_size() -> usize {
    tether_ws::config::DEFAULT_MAX_MESSAGE_SIZE
}

fn default_buffer_depth() -> usize {
    tether_ws::config::DEFAULT_SEND_BUFFER_DEPTH
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info" or "tether_ws=debug,hyper=warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingSettings {
    /// Convert into the telemetry logging configuration.
    pub fn to_log_config(&self) -> LogConfig {
        let base = match self.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };

        LogConfig {
            enabled: self.enabled,
            ..base.with_level(self.level.clone())
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter listen address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

impl MetricsSettings {
    /// Convert into the telemetry metrics configuration.
    pub fn to_metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.enabled,
            addr: self.addr.clone(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_defaults_match_library() {
        let config = SocketSettings::default().to_socket_config();
        assert_eq!(config, SocketConfig::default().prepare());
        assert_eq!(config.heartbeat_interval, Duration::from_secs(48));
    }

    #[test]
    fn test_socket_explicit_heartbeat() {
        let settings = SocketSettings {
            read_timeout_ms: 10_000,
            heartbeat_interval_ms: Some(2_000),
            ..Default::default()
        };
        let config = settings.to_socket_config();
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_socket_zero_values_default() {
        let settings = SocketSettings {
            write_timeout_ms: 0,
            read_timeout_ms: 0,
            max_message_size: 0,
            ..Default::default()
        };
        let config = settings.to_socket_config();
        assert_eq!(config.write_timeout, Duration::ZERO);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.max_message_size, 65_536);
    }

    #[test]
    fn test_log_format_maps_to_output() {
        let json = LoggingSettings::default().to_log_config();
        assert!(json.json_format);
        assert_eq!(json.level, "info");

        let pretty = LoggingSettings {
            enabled: false,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        }
        .to_log_config();
        assert!(!pretty.json_format);
        assert!(!pretty.enabled);
        assert_eq!(pretty.level, "debug");
    }

    #[test]
    fn test_metrics_settings() {
        let metrics = MetricsSettings::default().to_metrics_config();
        assert!(!metrics.enabled);
        assert_eq!(metrics.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_unknown_socket_field_rejected() {
        let result: Result<SocketSettings, _> = toml::from_str("read_timeout = 5");
        assert!(result.is_err());
    }
}
