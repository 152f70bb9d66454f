//! Connection lifecycle orchestration.
//!
//! [`start`] turns a negotiated transport into a running connection: it
//! builds the [`Socket`], tells the application about it, arms the read
//! deadline and spawns the write loop, read loop and disconnect watcher.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

use crate::config::SocketConfig;
use crate::socket::{ConnectionHandle, OnClosed, OnReceived, Outbound, Peer, Socket};
use tether_telemetry::metrics::record_connection_opened;

/// Callback invoked once a connection is open, with its outbound queue.
pub type OnConnected = Arc<dyn Fn(&Peer, Outbound) + Send + Sync>;

/// The application's connection event callbacks.
///
/// Every callback runs on a task owned by the connection; a callback that
/// blocks stalls that task.
#[derive(Clone)]
pub struct Callbacks {
    on_connected: OnConnected,
    on_received: OnReceived,
    on_closed: OnClosed,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_connected: Arc::new(|_, _| {}),
            on_received: Arc::new(|_, _| {}),
            on_closed: Arc::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

impl Callbacks {
    /// No-op callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the connection is open, before any frame is read.
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn(&Peer, Outbound) + Send + Sync + 'static,
    {
        self.on_connected = Arc::new(f);
        self
    }

    /// Called for every text or binary frame, in arrival order.
    pub fn on_received<F>(mut self, f: F) -> Self
    where
        F: Fn(&Peer, Bytes) + Send + Sync + 'static,
    {
        self.on_received = Arc::new(f);
        self
    }

    /// Called exactly once, after the transport has been closed.
    pub fn on_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Peer) + Send + Sync + 'static,
    {
        self.on_closed = Arc::new(f);
        self
    }
}

/// Start the lifecycle of a negotiated connection.
///
/// `on_connected` runs before this returns; the three connection tasks are
/// spawned and left running. Must be called inside a Tokio runtime.
pub fn start<S>(
    stream: WebSocketStream<S>,
    peer: Peer,
    config: &SocketConfig,
    callbacks: Callbacks,
) -> ConnectionHandle
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Callbacks {
        on_connected,
        on_received,
        on_closed,
    } = callbacks;

    let mut socket = Socket::new(stream, peer, config, Some(on_closed));
    let handle = socket.handle();

    on_connected(&peer, socket.outbound());
    socket.arm();

    let (writer, reader, watcher) = socket.into_tasks(on_received);
    let writer = tokio::spawn(writer.run());
    let reader = tokio::spawn(reader.run());
    tokio::spawn(watcher.run(writer, reader));

    record_connection_opened();
    info!(peer = %peer, "connection open");
    debug!(peer = %peer, "write loop, read loop and disconnect watcher started");

    handle
}
