//! In-memory WebSocket pairs and a scripted client peer.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, Role, WebSocketConfig};
use tungstenite::{Message, Utf8Bytes};

use crate::error::TestError;

/// Buffer size of each direction of an in-memory pair.
pub const DUPLEX_BUFFER: usize = 64 * 1024;

/// Default time a [`TestPeer`] waits for anything.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected server/client pair over an in-memory duplex pipe.
///
/// `server_config` applies to the server side; the client uses defaults.
pub async fn socket_pair(
    server_config: Option<WebSocketConfig>,
) -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (server_io, client_io) = duplex(DUPLEX_BUFFER);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, server_config).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (server, client)
}

/// The far end of a connection under test.
///
/// Every operation is bounded by the peer's timeout, so a test that waits
/// for something that never happens fails instead of hanging.
#[derive(Debug)]
pub struct TestPeer<S> {
    ws: WebSocketStream<S>,
    timeout: Duration,
}

impl<S> TestPeer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a client-side stream.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            timeout: DEFAULT_PEER_TIMEOUT,
        }
    }

    /// Set how long each operation may take.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), TestError> {
        self.send(Message::text(text)).await
    }

    /// Send a binary frame.
    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<(), TestError> {
        self.send(Message::Binary(data.into())).await
    }

    /// Send any message.
    pub async fn send(&mut self, message: Message) -> Result<(), TestError> {
        timeout(self.timeout, self.ws.send(message))
            .await
            .map_err(|_| TestError::Timeout(self.timeout, "send"))??;
        Ok(())
    }

    /// Receive the next message of any kind.
    pub async fn recv(&mut self) -> Result<Message, TestError> {
        match timeout(self.timeout, self.ws.next()).await {
            Err(_) => Err(TestError::Timeout(self.timeout, "message")),
            Ok(None) => Err(TestError::Closed(None)),
            Ok(Some(message)) => Ok(message?),
        }
    }

    /// Receive the payload of the next text or binary frame.
    ///
    /// Pings and pongs are skipped; a close frame is reported as
    /// [`TestError::Closed`].
    pub async fn recv_data(&mut self) -> Result<Bytes, TestError> {
        loop {
            match self.recv().await? {
                message @ (Message::Text(_) | Message::Binary(_)) => return Ok(message.into_data()),
                Message::Close(frame) => return Err(TestError::Closed(frame.map(|f| u16::from(f.code)))),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Wait for the connection to close, skipping everything else.
    ///
    /// Returns the code of the close frame, or `None` if the transport ended
    /// without one.
    pub async fn expect_close(&mut self) -> Result<Option<u16>, TestError> {
        loop {
            match self.recv().await {
                Ok(Message::Close(frame)) => return Ok(frame.map(|f| u16::from(f.code))),
                Ok(_) => {}
                Err(TestError::Closed(code)) => return Ok(code),
                Err(TestError::Transport(
                    tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Protocol(
                        tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
                    ),
                )) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }

    /// Start the closing handshake with `code`.
    pub async fn close(&mut self, code: u16) -> Result<(), TestError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Utf8Bytes::from_static(""),
        };
        timeout(self.timeout, self.ws.close(Some(frame)))
            .await
            .map_err(|_| TestError::Timeout(self.timeout, "close"))??;
        Ok(())
    }

    /// The underlying stream.
    pub fn into_inner(self) -> WebSocketStream<S> {
        self.ws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_carries_frames_both_ways() {
        let (server, client) = socket_pair(None).await;
        let mut server = TestPeer::new(server);
        let mut client = TestPeer::new(client);

        client.send_text("hello").await.unwrap();
        assert_eq!(server.recv_data().await.unwrap(), Bytes::from_static(b"hello"));

        server.send_binary(vec![1u8, 2, 3]).await.unwrap();
        assert_eq!(client.recv_data().await.unwrap(), Bytes::from_static(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn test_recv_data_skips_pings() {
        let (server, client) = socket_pair(None).await;
        let mut server = TestPeer::new(server);
        let mut client = TestPeer::new(client);

        server.send(Message::Ping(Bytes::new())).await.unwrap();
        server.send_text("after ping").await.unwrap();
        assert_eq!(client.recv_data().await.unwrap(), Bytes::from_static(b"after ping"));
    }

    #[tokio::test]
    async fn test_expect_close_reports_code() {
        let (server, client) = socket_pair(None).await;
        let mut server = TestPeer::new(server);
        let mut client = TestPeer::new(client);

        server.close(4000).await.unwrap();
        assert_eq!(client.expect_close().await.unwrap(), Some(4000));
    }

    #[tokio::test]
    async fn test_recv_times_out() {
        let (_server, client) = socket_pair(None).await;
        let mut client = TestPeer::new(client).with_timeout(Duration::from_millis(20));

        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, TestError::Timeout(_, "message")));
    }
}
