//! The per-connection socket: channels, loops and teardown.
//!
//! A [`Socket`] owns a live WebSocket transport and every channel its three
//! tasks use to coordinate. It is split by [`Socket::into_tasks`] into:
//!
//! - [`WriteLoop`] drains the outbound queue and sends heartbeat pings,
//! - [`ReadLoop`] delivers inbound payloads in arrival order,
//! - [`DisconnectWatcher`] waits for the first terminal signal and runs the
//!   close sequence exactly once.
//!
//! The tasks share no mutable state; they only talk through channels. The
//! read deadline is a `watch` value that any of them can push forward or
//! pull in.
//!
//! ```text
//!   Outbound ──queue──► WriteLoop ──┐
//!       │                           ├─failures─► DisconnectWatcher ──► close(code)
//!       └──disconnect(code)─────────┼──────────────────┘                  │
//!   peer ───────────────► ReadLoop ─┘                         join both loops, then
//!                                                             close frame + shutdown
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::frame::coding::CloseCode as FrameCloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::{Message, Utf8Bytes};
use uuid::Uuid;

use crate::config::SocketConfig;
use crate::error::{CloseCode, SendError, SocketError};
use tether_telemetry::metrics::{
    record_connection_closed, record_message_received, record_message_sent, record_ping_sent,
};

/// Slots in the internal failure channel, one per loop.
const FAILURE_SLOTS: usize = 2;

/// Bound on each close step when writes are otherwise unbounded.
const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Callback invoked once a connection has been torn down.
pub type OnClosed = Arc<dyn Fn(&Peer) + Send + Sync>;

/// Callback invoked for every data frame received, in arrival order.
pub type OnReceived = Arc<dyn Fn(&Peer, Bytes) + Send + Sync>;

/// Unique identifier for a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new connection ID (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The transport identity handed to every lifecycle callback.
///
/// Fixed when the connection is negotiated; two callbacks for the same
/// connection always see equal peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    id: ConnectionId,
    remote: Option<SocketAddr>,
}

impl Peer {
    /// A fresh identity for a connection from `remote`.
    pub fn new(remote: Option<SocketAddr>) -> Self {
        Self {
            id: ConnectionId::new(),
            remote,
        }
    }

    /// The connection ID.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote address, when the server recorded one.
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.remote {
            Some(addr) => write!(f, "{} ({})", self.id, addr),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The shared read deadline. `None` once the connection is closing.
#[derive(Debug, Clone)]
struct KeepAlive {
    deadline: Arc<watch::Sender<Option<Instant>>>,
    read_timeout: Duration,
}

impl KeepAlive {
    fn new(read_timeout: Duration) -> Self {
        let (deadline, _) = watch::channel(Some(Instant::now() + read_timeout));
        Self {
            deadline: Arc::new(deadline),
            read_timeout,
        }
    }

    /// Push the deadline a full read timeout into the future.
    ///
    /// Has no effect once the deadline has been expired.
    fn refresh(&self) {
        let next = Instant::now() + self.read_timeout;
        self.deadline.send_if_modified(|deadline| match deadline {
            Some(at) => {
                *at = next;
                true
            }
            None => false,
        });
    }

    /// Expire the deadline for good, unblocking a pending read.
    fn expire(&self) {
        self.deadline.send_replace(None);
    }

    fn subscribe(&self) -> watch::Receiver<Option<Instant>> {
        self.deadline.subscribe()
    }
}

/// Posts terminal failures to the disconnect watcher.
///
/// Posting never blocks; once the watcher has picked a path, further posts
/// are dropped.
#[derive(Debug, Clone)]
struct Failures(mpsc::Sender<SocketError>);

impl Failures {
    fn post(&self, err: SocketError) {
        if self.0.try_send(err).is_err() {
            debug!("connection already closing, failure dropped");
        }
    }
}

/// Run `op` under the write timeout, if there is one.
async fn bounded<T>(
    limit: Option<Duration>,
    op: impl Future<Output = Result<T, tungstenite::Error>>,
) -> Result<T, SocketError> {
    match limit {
        Some(limit) => timeout(limit, op)
            .await
            .map_err(|_| SocketError::WriteTimeout)?
            .map_err(SocketError::from_transport),
        None => op.await.map_err(SocketError::from_transport),
    }
}

/// Text frame for UTF-8 payloads, binary frame for everything else.
fn frame_for(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}

/// Producer handle for a connection's outbound queue.
///
/// Cloneable; every clone feeds the same single write loop, so payloads from
/// one producer are written in the order they were enqueued.
#[derive(Debug, Clone)]
pub struct Outbound {
    peer: Peer,
    queue: mpsc::Sender<Bytes>,
    disconnect: mpsc::Sender<u16>,
    failures: Failures,
    done: watch::Receiver<Option<u16>>,
}

impl Outbound {
    /// The connection this handle writes to.
    pub const fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Enqueue a payload, waiting for queue space.
    ///
    /// UTF-8 payloads go out as text frames, others as binary frames.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        self.queue
            .send(payload.into())
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Enqueue a payload without waiting.
    pub fn try_send(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        self.queue.try_send(payload.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask for the connection to be closed with `code`.
    ///
    /// Only the first request is acted on; later ones, and any made after
    /// teardown, are ignored.
    pub fn disconnect(&self, code: impl Into<u16>) {
        let code = code.into();
        if self.disconnect.try_send(code).is_err() {
            debug!(peer = %self.peer, code, "disconnect already requested");
        }
    }

    /// Give up on the connection as a producer.
    ///
    /// Treated like a transport failure: the connection closes abnormally.
    pub fn abandon(&self) {
        warn!(peer = %self.peer, "outbound producer abandoned connection");
        self.failures.post(SocketError::OutboundClosed);
    }

    /// Whether the connection has stopped accepting payloads.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed() || self.done.borrow().is_some()
    }
}

/// Observer handle for a running connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    peer: Peer,
    outbound: Outbound,
    done: watch::Receiver<Option<u16>>,
    report: Option<oneshot::Receiver<SocketError>>,
}

impl ConnectionHandle {
    /// The connection's identity.
    pub const fn peer(&self) -> &Peer {
        &self.peer
    }

    /// The connection's outbound queue.
    pub const fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Ask for the connection to be closed with `code`.
    pub fn disconnect(&self, code: impl Into<u16>) {
        self.outbound.disconnect(code);
    }

    /// Whether teardown has completed.
    pub fn is_closed(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for teardown to complete and return the close code that was sent.
    ///
    /// Returns `None` if the connection's tasks went away without finishing
    /// the close sequence.
    pub async fn closed(&self) -> Option<u16> {
        let mut done = self.done.clone();
        done.wait_for(Option::is_some).await.ok().and_then(|code| *code)
    }

    /// Wait for the connection's error report.
    ///
    /// Yields the end-of-stream error when the peer disconnected cleanly, and
    /// `None` for every other teardown cause. Only the first call can
    /// observe the report.
    pub async fn error_report(&mut self) -> Option<SocketError> {
        self.report.take()?.await.ok()
    }
}

/// A live connection that has not been started yet.
pub struct Socket<S> {
    stream: WebSocketStream<S>,
    peer: Peer,
    write_timeout: Option<Duration>,
    heartbeat_interval: Duration,
    max_message_size: usize,
    keepalive: KeepAlive,
    outbound_tx: mpsc::Sender<Bytes>,
    outbound_rx: mpsc::Receiver<Bytes>,
    failures_tx: mpsc::Sender<SocketError>,
    failures_rx: mpsc::Receiver<SocketError>,
    disconnect_tx: mpsc::Sender<u16>,
    disconnect_rx: mpsc::Receiver<u16>,
    done_tx: watch::Sender<Option<u16>>,
    report_tx: oneshot::Sender<SocketError>,
    report_rx: Option<oneshot::Receiver<SocketError>>,
    stop_tx: oneshot::Sender<()>,
    stop_rx: oneshot::Receiver<()>,
    on_closed: Option<OnClosed>,
}

impl<S> std::fmt::Debug for Socket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("peer", &self.peer)
            .field("write_timeout", &self.write_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}

impl<S> Socket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Allocate the channels for a connection. No task is started.
    ///
    /// Zero-valued tunables in `config` fall back to their defaults. The
    /// outbound queue holds up to `max_message_size` payloads.
    pub fn new(
        stream: WebSocketStream<S>,
        peer: Peer,
        config: &SocketConfig,
        on_closed: Option<OnClosed>,
    ) -> Self {
        let config = config.clone().prepare();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity());
        let (failures_tx, failures_rx) = mpsc::channel(FAILURE_SLOTS);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(1);
        let (done_tx, _) = watch::channel(None);
        let (report_tx, report_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        Self {
            stream,
            peer,
            write_timeout: config.write_deadline(),
            heartbeat_interval: config.heartbeat_interval,
            max_message_size: config.max_message_size,
            keepalive: KeepAlive::new(config.read_timeout),
            outbound_tx,
            outbound_rx,
            failures_tx,
            failures_rx,
            disconnect_tx,
            disconnect_rx,
            done_tx,
            report_tx,
            report_rx: Some(report_rx),
            stop_tx,
            stop_rx,
            on_closed,
        }
    }

    /// The connection's identity.
    pub const fn peer(&self) -> &Peer {
        &self.peer
    }

    /// A producer handle for the outbound queue.
    pub fn outbound(&self) -> Outbound {
        Outbound {
            peer: self.peer,
            queue: self.outbound_tx.clone(),
            disconnect: self.disconnect_tx.clone(),
            failures: Failures(self.failures_tx.clone()),
            done: self.done_tx.subscribe(),
        }
    }

    /// An observer handle. The error report goes to the first handle taken.
    pub fn handle(&mut self) -> ConnectionHandle {
        ConnectionHandle {
            peer: self.peer,
            outbound: self.outbound(),
            done: self.done_tx.subscribe(),
            report: self.report_rx.take(),
        }
    }

    /// Start the read deadline.
    ///
    /// The read loop rejects any message above `max_message_size`, whatever
    /// limit the stream itself was built with. Pings and pongs from the peer
    /// refresh the deadline inside the read loop.
    pub fn arm(&self) {
        self.keepalive.refresh();
        debug!(
            peer = %self.peer,
            read_timeout = ?self.keepalive.read_timeout,
            read_limit = self.max_message_size,
            "read deadline armed"
        );
    }

    /// Split the connection into its three tasks.
    pub fn into_tasks(
        self,
        on_received: OnReceived,
    ) -> (WriteLoop<S>, ReadLoop<S>, DisconnectWatcher) {
        let (sink, stream) = self.stream.split();
        let failures = Failures(self.failures_tx);

        let writer = WriteLoop {
            sink,
            peer: self.peer,
            outbound: self.outbound_rx,
            stop: self.stop_rx,
            failures: failures.clone(),
            keepalive: self.keepalive.clone(),
            write_timeout: self.write_timeout,
            heartbeat_interval: self.heartbeat_interval,
        };

        let reader = ReadLoop {
            stream,
            peer: self.peer,
            failures,
            keepalive: self.keepalive.clone(),
            max_message_size: self.max_message_size,
            on_received,
        };

        let watcher = DisconnectWatcher {
            peer: self.peer,
            failures: self.failures_rx,
            disconnect: self.disconnect_rx,
            stop: self.stop_tx,
            done: self.done_tx,
            report: self.report_tx,
            keepalive: self.keepalive,
            write_timeout: self.write_timeout,
            on_closed: self.on_closed,
            _keeper: self.outbound_tx,
        };

        (writer, reader, watcher)
    }
}

/// Writes queued payloads and heartbeat pings.
pub struct WriteLoop<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    peer: Peer,
    outbound: mpsc::Receiver<Bytes>,
    stop: oneshot::Receiver<()>,
    failures: Failures,
    keepalive: KeepAlive,
    write_timeout: Option<Duration>,
    heartbeat_interval: Duration,
}

impl<S> WriteLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run until stopped or until a write fails; returns the sink half.
    ///
    /// The heartbeat timer lives exactly as long as this call.
    pub async fn run(mut self) -> SplitSink<WebSocketStream<S>, Message> {
        let period = self.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(peer = %self.peer, ?period, "heartbeat started");

        loop {
            tokio::select! {
                biased;

                _ = &mut self.stop => break,

                payload = self.outbound.recv() => {
                    let Some(payload) = payload else {
                        error!(peer = %self.peer, "outbound queue closed");
                        self.failures.post(SocketError::OutboundClosed);
                        break;
                    };
                    match self.write(payload).await {
                        Ok(Written::Sent) => {}
                        Ok(Written::Stopped) => break,
                        Err(err) => {
                            error!(peer = %self.peer, error = %err, "error writing to socket");
                            self.failures.post(err);
                            break;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    match self.ping().await {
                        Ok(Written::Sent) => {}
                        Ok(Written::Stopped) => break,
                        Err(err) => {
                            error!(peer = %self.peer, error = %err, "error pinging socket");
                            self.failures.post(err);
                            break;
                        }
                    }
                }
            }
        }

        debug!(peer = %self.peer, "heartbeat stopped, write loop finished");
        self.sink
    }

    async fn write(&mut self, payload: Bytes) -> Result<Written, SocketError> {
        let size = payload.len();
        debug!(peer = %self.peer, size, "writing to socket");

        self.keepalive.refresh();
        let written = self.send(frame_for(payload)).await?;
        if written == Written::Sent {
            self.keepalive.refresh();
            record_message_sent(size);
        }
        Ok(written)
    }

    async fn ping(&mut self) -> Result<Written, SocketError> {
        debug!(peer = %self.peer, "pinging socket");
        let written = self.send(Message::Ping(Bytes::new())).await?;
        if written == Written::Sent {
            record_ping_sent();
        }
        Ok(written)
    }

    /// Send one frame, giving up on it as soon as the stop signal arrives.
    ///
    /// A peer that stops reading can hold a write forever when writes are
    /// unbounded; the close sequence must not wait on it.
    async fn send(&mut self, message: Message) -> Result<Written, SocketError> {
        let send = bounded(self.write_timeout, self.sink.send(message));
        tokio::select! {
            biased;

            _ = &mut self.stop => {
                debug!(peer = %self.peer, "write abandoned by close");
                Ok(Written::Stopped)
            }
            result = send => result.map(|()| Written::Sent),
        }
    }
}

/// How a single write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Written {
    Sent,
    Stopped,
}

/// Reads frames and hands data payloads to the receive callback.
pub struct ReadLoop<S> {
    stream: SplitStream<WebSocketStream<S>>,
    peer: Peer,
    failures: Failures,
    keepalive: KeepAlive,
    max_message_size: usize,
    on_received: OnReceived,
}

impl<S> ReadLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run until a read fails, the deadline passes or the connection starts
    /// closing; returns the stream half.
    pub async fn run(mut self) -> SplitStream<WebSocketStream<S>> {
        let mut deadline = self.keepalive.subscribe();

        loop {
            let Some(until) = *deadline.borrow_and_update() else {
                debug!(peer = %self.peer, "read deadline expired by close");
                break;
            };
            if until <= Instant::now() {
                self.fail(SocketError::ReadTimeout);
                break;
            }

            tokio::select! {
                biased;

                _ = deadline.changed() => continue,

                () = sleep_until(until) => {
                    self.fail(SocketError::ReadTimeout);
                    break;
                }

                frame = self.stream.next() => match frame {
                    Some(Ok(message)) => {
                        if let Err(err) = self.deliver(message) {
                            self.fail(err);
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        self.fail(SocketError::from_transport(err));
                        break;
                    }
                    None => {
                        self.fail(SocketError::EndOfStream);
                        break;
                    }
                },
            }
        }

        debug!(peer = %self.peer, "read loop finished");
        self.stream
    }

    /// Handle one inbound message.
    ///
    /// Fails with end-of-stream when the peer closed, and with
    /// `MessageTooLarge` when a payload exceeds the read limit.
    fn deliver(&self, message: Message) -> Result<(), SocketError> {
        match message {
            Message::Text(_) | Message::Binary(_) => {
                let payload = message.into_data();
                let size = payload.len();
                if size > self.max_message_size {
                    return Err(SocketError::MessageTooLarge {
                        size,
                        limit: self.max_message_size,
                    });
                }
                debug!(peer = %self.peer, size, "read message from socket");
                (self.on_received)(&self.peer, payload);
                record_message_received(size);
                self.keepalive.refresh();
            }
            Message::Ping(_) | Message::Pong(_) => {
                debug!(peer = %self.peer, "heartbeat from peer");
                self.keepalive.refresh();
            }
            Message::Close(frame) => {
                debug!(peer = %self.peer, ?frame, "peer sent close frame");
                return Err(SocketError::EndOfStream);
            }
            Message::Frame(_) => {}
        }
        Ok(())
    }

    fn fail(&self, err: SocketError) {
        if err.is_end_of_stream() {
            debug!(peer = %self.peer, "peer closed connection");
        } else {
            warn!(peer = %self.peer, error = %err, "error reading from socket");
        }
        self.failures.post(err);
    }
}

/// Waits for the first terminal signal and closes the connection.
pub struct DisconnectWatcher {
    peer: Peer,
    failures: mpsc::Receiver<SocketError>,
    disconnect: mpsc::Receiver<u16>,
    stop: oneshot::Sender<()>,
    done: watch::Sender<Option<u16>>,
    report: oneshot::Sender<SocketError>,
    keepalive: KeepAlive,
    write_timeout: Option<Duration>,
    on_closed: Option<OnClosed>,
    // Keeps the outbound queue open after the application drops its handles.
    _keeper: mpsc::Sender<Bytes>,
}

impl DisconnectWatcher {
    /// Pick exactly one close path, run the close sequence and return the
    /// close code sent.
    ///
    /// `writer` and `reader` are the running loops; both are joined before
    /// the transport is touched.
    pub async fn run<S>(
        mut self,
        writer: JoinHandle<SplitSink<WebSocketStream<S>, Message>>,
        reader: JoinHandle<SplitStream<WebSocketStream<S>>>,
    ) -> u16
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut report = None;

        let code = tokio::select! {
            Some(err) = self.failures.recv() => {
                let code = err.close_code();
                if err.is_end_of_stream() {
                    report = Some(err);
                }
                code.as_u16()
            }
            Some(code) = self.disconnect.recv() => code,
            else => CloseCode::Abnormal.as_u16(),
        };

        self.close(code, report, writer, reader).await;
        code
    }

    async fn close<S>(
        self,
        code: u16,
        report: Option<SocketError>,
        writer: JoinHandle<SplitSink<WebSocketStream<S>, Message>>,
        reader: JoinHandle<SplitStream<WebSocketStream<S>>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Self {
            peer,
            failures,
            disconnect,
            stop,
            done,
            report: report_tx,
            keepalive,
            write_timeout,
            on_closed,
            _keeper,
        } = self;

        if let Some(err) = report {
            let _ = report_tx.send(err);
        } else {
            drop(report_tx);
        }

        debug!(peer = %peer, code, "closing connection");
        let _ = stop.send(());
        keepalive.expire();

        match (writer.await, reader.await) {
            (Ok(sink), Ok(stream)) => match sink.reunite(stream) {
                Ok(ws) => shutdown(ws, &peer, code, write_timeout).await,
                Err(err) => error!(peer = %peer, error = %err, "socket halves do not match"),
            },
            _ => error!(peer = %peer, "connection task failed, transport dropped without close frame"),
        }

        // Closed: nothing posted from here on is observed.
        drop(failures);
        drop(disconnect);
        done.send_replace(Some(code));
        drop(done);

        if let Some(on_closed) = on_closed {
            on_closed(&peer);
        }

        record_connection_closed(code);
        info!(peer = %peer, code, "connection closed");
    }
}

/// Send the close frame and shut the transport down.
async fn shutdown<S>(
    mut ws: WebSocketStream<S>,
    peer: &Peer,
    code: u16,
    write_timeout: Option<Duration>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code: FrameCloseCode::from(code),
        reason: Utf8Bytes::from_static(""),
    };

    // Bounded even when writes are not.
    let limit = write_timeout.unwrap_or(CLOSE_LINGER);

    debug!(peer = %peer, code, "sending close frame");
    match bounded(Some(limit), ws.close(Some(frame))).await {
        Ok(()) => {}
        Err(SocketError::WriteTimeout) => {
            debug!(peer = %peer, ?limit, "close frame not sent in time");
        }
        Err(err) => {
            // After a peer-initiated close only the queued reply can still go out.
            debug!(peer = %peer, error = %err, "close frame not sent");
            let _ = bounded(Some(limit), SinkExt::flush(&mut ws)).await;
        }
    }

    let result = timeout(limit, ws.get_mut().shutdown())
        .await
        .unwrap_or_else(|_| Err(std::io::ErrorKind::TimedOut.into()));

    if let Err(err) = result {
        error!(peer = %peer, error = %err, "socket could not be closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_test::socket_pair;

    #[test]
    fn test_peer_display() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let peer = Peer::new(Some(addr));
        assert!(peer.to_string().ends_with("(127.0.0.1:4000)"));
        assert_eq!(Peer::new(None).to_string().len(), 36);
        assert_ne!(Peer::new(None), Peer::new(None));
    }

    #[test]
    fn test_frame_for_payload() {
        assert!(matches!(frame_for(Bytes::from_static(b"pong")), Message::Text(_)));
        assert!(matches!(
            frame_for(Bytes::from_static(&[0xff, 0x00, 0x80])),
            Message::Binary(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_refresh_and_expire() {
        let keepalive = KeepAlive::new(Duration::from_secs(10));
        let deadline = keepalive.subscribe();
        let start = Instant::now();

        tokio::time::advance(Duration::from_secs(4)).await;
        keepalive.refresh();
        assert_eq!(*deadline.borrow(), Some(start + Duration::from_secs(14)));

        keepalive.expire();
        assert_eq!(*deadline.borrow(), None);

        // A late refresh from the write loop must not revive the deadline.
        keepalive.refresh();
        assert_eq!(*deadline.borrow(), None);
    }

    #[tokio::test]
    async fn test_outbound_before_start() {
        let (server, _client) = socket_pair(None).await;
        let config = SocketConfig::default().max_message_size(2);
        let mut socket = Socket::new(server, Peer::new(None), &config, None);

        let outbound = socket.outbound();
        let handle = socket.handle();
        assert_eq!(outbound.peer(), handle.peer());
        assert!(!outbound.is_closed());

        outbound.try_send("a").unwrap();
        outbound.send("b").await.unwrap();
        assert_eq!(outbound.try_send("c"), Err(SendError::Full));
    }

    #[tokio::test]
    async fn test_closed_pending_until_completion() {
        let (server, _client) = socket_pair(None).await;
        let mut socket = Socket::new(server, Peer::new(None), &SocketConfig::default(), None);
        let handle = socket.handle();

        let mut closed = tokio_test::task::spawn(handle.closed());
        tokio_test::assert_pending!(closed.poll());

        socket.done_tx.send_replace(Some(1000));
        assert!(closed.is_woken());
        assert_eq!(tokio_test::assert_ready!(closed.poll()), Some(1000));
        drop(closed);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_only_first_handle_gets_error_report() {
        let (server, _client) = socket_pair(None).await;
        let mut socket = Socket::new(server, Peer::new(None), &SocketConfig::default(), None);

        let first = socket.handle();
        let mut second = socket.handle();
        assert!(first.report.is_some());
        assert!(second.error_report().await.is_none());
    }

    #[tokio::test]
    async fn test_failures_post_is_inert_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let failures = Failures(tx);
        failures.post(SocketError::ReadTimeout);
        failures.post(SocketError::WriteTimeout);

        assert!(matches!(rx.recv().await, Some(SocketError::ReadTimeout)));
        drop(failures);
        assert!(rx.recv().await.is_none());
    }
}
