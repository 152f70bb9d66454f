//! Typed configuration for Tether services.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict parsing (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`TetherConfig`] holds every section:
//!
//! - [`ServerSettings`] - bind address and WebSocket route
//! - [`SocketSettings`] - per-connection timeouts, heartbeat and size limits
//! - [`LoggingSettings`] - log level and output format
//! - [`MetricsSettings`] - Prometheus exporter
//!
//! # Example
//!
//! ```no_run
//! use tether_config::ConfigLoader;
//!
//! # fn main() -> Result<(), tether_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("tether.toml")?
//!     .with_env_prefix("TETHER")
//!     .load()?;
//!
//! let socket = config.socket.to_socket_config();
//! println!("heartbeat every {:?}", socket.heartbeat_interval);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! ws_path = "/ws"
//!
//! [socket]
//! write_timeout_ms = 60000
//! read_timeout_ms = 60000
//! heartbeat_interval_ms = 48000
//! max_message_size = 65536
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `TETHER__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `TETHER__SOCKET__READ_TIMEOUT_MS=30000`
//! - `TETHER__LOGGING__FORMAT=pretty`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::TetherConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LogFormat, LoggingSettings, MetricsSettings, ServerSettings, SocketSettings};
