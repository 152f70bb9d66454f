//! WebSocket connection configuration.
//!
//! [`SocketConfig`] holds the tunables shared by every connection accepted
//! through an entry point. It is built once, prepared with
//! [`SocketConfig::prepare`], and shared behind an `Arc` afterwards.

use std::time::Duration;

use tungstenite::protocol::WebSocketConfig;

/// Default time allowed for a single write before the connection fails.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time allowed between frames from the peer.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum message size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65_536;

/// Default depth of the send buffer.
pub const DEFAULT_SEND_BUFFER_DEPTH: usize = 10;

/// Default depth of the receive buffer.
pub const DEFAULT_RECEIVE_BUFFER_DEPTH: usize = 10;

/// Shortest heartbeat period derived from a read timeout.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a WebSocket connection.
///
/// A zero value in any field except `write_timeout` means "use the default";
/// [`prepare`](Self::prepare) performs that substitution. A zero
/// `write_timeout` is kept and means writes never time out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Time allowed for a single write, ping or close frame (default: 60 seconds).
    pub write_timeout: Duration,
    /// Time allowed between frames from the peer (default: 60 seconds).
    pub read_timeout: Duration,
    /// Interval between heartbeat pings.
    ///
    /// Zero (the default) derives it from `read_timeout` at 80%, so a
    /// shortened read timeout shortens the ping period too.
    pub heartbeat_interval: Duration,
    /// Maximum message size in bytes, also the outbound queue budget (default: 64 KB).
    pub max_message_size: usize,
    /// Send buffer depth (default: 10).
    ///
    /// Reserved: carried and defaulted for callers that size their own
    /// buffers from it. The outbound queue is sized by `max_message_size`.
    pub send_buffer_depth: usize,
    /// Receive buffer depth (default: 10).
    ///
    /// Reserved in the same way as `send_buffer_depth`; inbound payloads
    /// are handed to the receive callback without buffering.
    pub receive_buffer_depth: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            heartbeat_interval: Duration::ZERO,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            send_buffer_depth: DEFAULT_SEND_BUFFER_DEPTH,
            receive_buffer_depth: DEFAULT_RECEIVE_BUFFER_DEPTH,
        }
    }
}

impl SocketConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write timeout. `Duration::ZERO` disables write timeouts.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the read timeout.
    ///
    /// Unless a heartbeat interval is set explicitly, [`prepare`](Self::prepare)
    /// derives it from this value.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the maximum message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the send buffer depth.
    pub fn send_buffer_depth(mut self, depth: usize) -> Self {
        self.send_buffer_depth = depth;
        self
    }

    /// Set the receive buffer depth.
    pub fn receive_buffer_depth(mut self, depth: usize) -> Self {
        self.receive_buffer_depth = depth;
        self
    }

    /// Replace zero-valued fields with their defaults.
    ///
    /// `write_timeout` is left alone. A zero `heartbeat_interval` becomes 80%
    /// of the (already defaulted) read timeout.
    pub fn prepare(mut self) -> Self {
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.heartbeat_interval.is_zero() {
            self.heartbeat_interval = heartbeat_for(self.read_timeout);
        }
        if self.max_message_size == 0 {
            self.max_message_size = DEFAULT_MAX_MESSAGE_SIZE;
        }
        if self.send_buffer_depth == 0 {
            self.send_buffer_depth = DEFAULT_SEND_BUFFER_DEPTH;
        }
        if self.receive_buffer_depth == 0 {
            self.receive_buffer_depth = DEFAULT_RECEIVE_BUFFER_DEPTH;
        }
        self
    }

    /// The write timeout, or `None` when writes never time out.
    pub fn write_deadline(&self) -> Option<Duration> {
        (!self.write_timeout.is_zero()).then_some(self.write_timeout)
    }

    /// Capacity of a connection's outbound queue.
    pub fn outbound_capacity(&self) -> usize {
        self.max_message_size.max(1)
    }

    /// Protocol settings for a transport created with this configuration.
    ///
    /// The read limit for both messages and single frames is
    /// `max_message_size`.
    pub fn stream_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

/// 80% of the read timeout, so a ping lands before the peer's deadline.
fn heartbeat_for(read_timeout: Duration) -> Duration {
    (read_timeout * 8 / 10).max(MIN_HEARTBEAT_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn zeroed() -> SocketConfig {
        SocketConfig {
            write_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            heartbeat_interval: Duration::ZERO,
            max_message_size: 0,
            send_buffer_depth: 0,
            receive_buffer_depth: 0,
        }
    }

    #[test]
    fn test_socket_config_default() {
        let config = SocketConfig::default();
        assert_eq!(config.write_timeout, Duration::from_secs(60));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::ZERO);
        assert_eq!(config.clone().prepare().heartbeat_interval, Duration::from_secs(48));
        assert_eq!(config.max_message_size, 65_536);
        assert_eq!(config.send_buffer_depth, 10);
        assert_eq!(config.receive_buffer_depth, 10);
    }

    #[test]
    fn test_socket_config_builder() {
        let config = SocketConfig::new()
            .write_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(20))
            .heartbeat_interval(Duration::from_secs(10))
            .max_message_size(1024)
            .send_buffer_depth(4)
            .receive_buffer_depth(8);

        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(20));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 1024);
        assert_eq!(config.send_buffer_depth, 4);
        assert_eq!(config.receive_buffer_depth, 8);
    }

    #[test]
    fn test_prepare_fills_zero_fields_except_write_timeout() {
        let config = zeroed().prepare();
        assert_eq!(config.write_timeout, Duration::ZERO);
        assert_eq!(config.write_deadline(), None);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(48));
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.send_buffer_depth, DEFAULT_SEND_BUFFER_DEPTH);
        assert_eq!(config.receive_buffer_depth, DEFAULT_RECEIVE_BUFFER_DEPTH);
    }

    #[test]
    fn test_prepare_derives_heartbeat_from_read_timeout() {
        let config = SocketConfig {
            read_timeout: Duration::from_secs(10),
            ..zeroed()
        }
        .prepare();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(8));
    }

    #[test]
    fn test_read_timeout_alone_shortens_heartbeat() {
        let config = SocketConfig::new()
            .read_timeout(Duration::from_millis(300))
            .prepare();
        assert_eq!(config.read_timeout, Duration::from_millis(300));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(240));
    }

    #[test]
    fn test_tiny_read_timeout_keeps_heartbeat_positive() {
        let config = SocketConfig::new()
            .read_timeout(Duration::from_nanos(1))
            .prepare();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_prepare_keeps_explicit_values() {
        let config = SocketConfig::new()
            .read_timeout(Duration::from_secs(30))
            .heartbeat_interval(Duration::from_secs(5))
            .prepare();
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.write_deadline(), Some(DEFAULT_WRITE_TIMEOUT));
    }

    #[test]
    fn test_stream_config_applies_read_limit() {
        let config = SocketConfig::new().max_message_size(4096).stream_config();
        assert_eq!(config.max_message_size, Some(4096));
        assert_eq!(config.max_frame_size, Some(4096));
    }

    proptest! {
        #[test]
        fn prepared_config_has_no_zero_tunables(
            read_ns in 0u64..600_000_000_000,
            heartbeat_ms in 0u64..600_000,
            max_size in 0usize..1_000_000,
            depth in 0usize..64,
        ) {
            let config = SocketConfig {
                read_timeout: Duration::from_nanos(read_ns),
                heartbeat_interval: Duration::from_millis(heartbeat_ms),
                max_message_size: max_size,
                send_buffer_depth: depth,
                receive_buffer_depth: depth,
                ..zeroed()
            }
            .prepare();

            prop_assert!(!config.read_timeout.is_zero());
            prop_assert!(!config.heartbeat_interval.is_zero());
            prop_assert!(config.max_message_size > 0);
            prop_assert!(config.send_buffer_depth > 0);
            prop_assert!(config.receive_buffer_depth > 0);
            if heartbeat_ms == 0 {
                prop_assert_eq!(
                    config.heartbeat_interval,
                    (config.read_timeout * 8 / 10).max(Duration::from_millis(1))
                );
            } else {
                prop_assert_eq!(config.heartbeat_interval, Duration::from_millis(heartbeat_ms));
            }
        }
    }
}
