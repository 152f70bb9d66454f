//! Observability for Tether WebSocket services.
//!
//! - **Logging**: structured JSON or human-readable output through
//!   `tracing-subscriber`, filtered with an `EnvFilter` directive.
//! - **Metrics**: connection lifecycle counters and gauges recorded through
//!   the `metrics` facade, optionally exported in Prometheus format.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tether_ws_negotiations_total` | Counter | `status` | Upgrade attempts by outcome |
//! | `tether_ws_connections_opened_total` | Counter | - | Connections that reached the open phase |
//! | `tether_ws_connections_closed_total` | Counter | `code` | Teardowns by close code |
//! | `tether_ws_connections_active` | Gauge | - | Connections currently open |
//! | `tether_ws_messages_received_total` | Counter | - | Data frames delivered to the application |
//! | `tether_ws_messages_sent_total` | Counter | - | Data frames written to peers |
//! | `tether_ws_bytes_received_total` | Counter | - | Payload bytes received |
//! | `tether_ws_bytes_sent_total` | Counter | - | Payload bytes sent |
//! | `tether_ws_pings_sent_total` | Counter | - | Heartbeat pings written |
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
//!
//! init_logging(&LogConfig::development())?;
//! init_metrics(&MetricsConfig::default())?;
//!
//! tracing::info!(peer = "127.0.0.1:50122", "connection established");
//! ```

#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use self::logging::{init_logging, LogConfig};
pub use self::metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
