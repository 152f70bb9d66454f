//! Connection metrics for Tether.
//!
//! Recording functions go through the `metrics` facade and are no-ops until
//! a recorder is installed. [`init_metrics`] installs the Prometheus
//! exporter with its own HTTP listener.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Upgrade attempts by resulting status.
pub const NEGOTIATIONS_TOTAL: &str = "tether_ws_negotiations_total";
/// Connections that reached the open phase.
pub const CONNECTIONS_OPENED_TOTAL: &str = "tether_ws_connections_opened_total";
/// Teardowns by close code.
pub const CONNECTIONS_CLOSED_TOTAL: &str = "tether_ws_connections_closed_total";
/// Connections currently open.
pub const CONNECTIONS_ACTIVE: &str = "tether_ws_connections_active";
/// Data frames delivered to the application.
pub const MESSAGES_RECEIVED_TOTAL: &str = "tether_ws_messages_received_total";
/// Data frames written to peers.
pub const MESSAGES_SENT_TOTAL: &str = "tether_ws_messages_sent_total";
/// Payload bytes received.
pub const BYTES_RECEIVED_TOTAL: &str = "tether_ws_bytes_received_total";
/// Payload bytes sent.
pub const BYTES_SENT_TOTAL: &str = "tether_ws_bytes_sent_total";
/// Heartbeat pings written.
pub const PINGS_SENT_TOTAL: &str = "tether_ws_pings_sent_total";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether the Prometheus exporter is installed.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and its HTTP listener.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();

    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(NEGOTIATIONS_TOTAL, "WebSocket upgrade attempts by status");
    describe_counter!(
        CONNECTIONS_OPENED_TOTAL,
        "WebSocket connections that reached the open phase"
    );
    describe_counter!(
        CONNECTIONS_CLOSED_TOTAL,
        "WebSocket connections torn down, by close code"
    );
    describe_gauge!(CONNECTIONS_ACTIVE, "WebSocket connections currently open");
    describe_counter!(
        MESSAGES_RECEIVED_TOTAL,
        "Data frames delivered to the application"
    );
    describe_counter!(MESSAGES_SENT_TOTAL, "Data frames written to peers");
    describe_counter!(BYTES_RECEIVED_TOTAL, "Payload bytes received from peers");
    describe_counter!(BYTES_SENT_TOTAL, "Payload bytes written to peers");
    describe_counter!(PINGS_SENT_TOTAL, "Heartbeat pings written to peers");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Records the outcome of an upgrade attempt.
pub fn record_negotiation(status_code: u16) {
    counter!(NEGOTIATIONS_TOTAL, "status" => status_code.to_string()).increment(1);
}

/// Records a connection entering the open phase.
pub fn record_connection_opened() {
    counter!(CONNECTIONS_OPENED_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Records a completed teardown with the close code that was sent.
pub fn record_connection_closed(code: u16) {
    counter!(CONNECTIONS_CLOSED_TOTAL, "code" => code.to_string()).increment(1);
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Records a data frame delivered to the application.
pub fn record_message_received(size_bytes: usize) {
    counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
    counter!(BYTES_RECEIVED_TOTAL).increment(size_bytes as u64);
}

/// Records a data frame written to the peer.
pub fn record_message_sent(size_bytes: usize) {
    counter!(MESSAGES_SENT_TOTAL).increment(1);
    counter!(BYTES_SENT_TOTAL).increment(size_bytes as u64);
}

/// Records a heartbeat ping written to the peer.
pub fn record_ping_sent() {
    counter!(PINGS_SENT_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        let err = init_metrics(&config).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidAddress(_)));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        // No recorder is installed here; the facade swallows everything.
        record_negotiation(101);
        record_negotiation(403);
        record_connection_opened();
        record_message_received(9);
        record_message_sent(4);
        record_ping_sent();
        record_connection_closed(1000);
    }
}
