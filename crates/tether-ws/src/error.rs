//! Error types for WebSocket negotiation and connection handling.
//!
//! Negotiation failures are reported synchronously and never produce a
//! connection. Connection failures are funneled into the disconnect watcher
//! and only classified as end-of-stream or not.

use std::fmt;

use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::Full;
use thiserror::Error;

/// Errors produced while deciding on and performing an upgrade.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The request method is not GET.
    #[error("method {0} not allowed for WebSocket upgrade")]
    MethodNotAllowed(http::Method),

    /// The declared origin does not match the request host.
    #[error("origin {origin:?} not allowed for host {host:?}")]
    OriginForbidden {
        /// Declared origin, if any.
        origin: Option<String>,
        /// Target host, if any.
        host: Option<String>,
    },

    /// The protocol handshake headers are missing or malformed.
    #[error("WebSocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connection could not be switched to the WebSocket protocol.
    #[error("WebSocket upgrade failed: {0}")]
    UpgradeFailed(String),
}

impl NegotiationError {
    /// Create a new handshake failed error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed(reason.into())
    }

    /// Create a new upgrade failed error.
    pub fn upgrade_failed(reason: impl Into<String>) -> Self {
        Self::UpgradeFailed(reason.into())
    }

    /// The status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::OriginForbidden { .. } => StatusCode::FORBIDDEN,
            Self::HandshakeFailed(_) | Self::UpgradeFailed(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// A plain-text error response for this failure.
    ///
    /// Transport failures get a generic body; the details only go to the log.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status();
        let body = match self {
            Self::UpgradeFailed(_) => "Unable to upgrade connection".to_string(),
            other => other.to_string(),
        };

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| {
                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() = status;
                response
            })
    }
}

/// Terminal failures detected by a connection's read or write loop.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer closed the connection cleanly.
    #[error("connection closed by peer")]
    EndOfStream,

    /// Nothing arrived from the peer within the read timeout.
    #[error("read timed out")]
    ReadTimeout,

    /// A write, ping or close frame did not complete within the write timeout.
    #[error("write timed out")]
    WriteTimeout,

    /// A message from the peer exceeded the read limit.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Size of the rejected message.
        size: usize,
        /// Configured maximum message size.
        limit: usize,
    },

    /// The producer side of the outbound queue went away.
    #[error("outbound queue closed")]
    OutboundClosed,

    /// Any other protocol or I/O failure.
    #[error("transport error: {0}")]
    Transport(tungstenite::Error),
}

impl SocketError {
    /// Classify a transport error.
    ///
    /// A connection that is already closed counts as end-of-stream.
    pub fn from_transport(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::EndOfStream
            }
            other => Self::Transport(other),
        }
    }

    /// Whether this error is a clean end-of-stream.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// The close code the teardown path sends for this error.
    pub fn close_code(&self) -> CloseCode {
        if self.is_end_of_stream() {
            CloseCode::Normal
        } else {
            CloseCode::Abnormal
        }
    }
}

impl From<tungstenite::Error> for SocketError {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_transport(err)
    }
}

/// Errors returned when enqueueing an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection has been torn down.
    #[error("connection closed")]
    Closed,

    /// The outbound queue is full.
    #[error("outbound queue full")]
    Full,
}

/// Close code for WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    Protocol = 1002,
    /// Unsupported data (1003).
    Unsupported = 1003,
    /// No status received (1005).
    NoStatus = 1005,
    /// Abnormal closure (1006).
    Abnormal = 1006,
    /// Invalid payload data (1007).
    InvalidPayload = 1007,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Message too big (1009).
    MessageTooBig = 1009,
    /// Extension required (1010).
    ExtensionRequired = 1010,
    /// Internal error (1011).
    InternalError = 1011,
    /// Service restart (1012).
    ServiceRestart = 1012,
    /// Try again later (1013).
    TryAgainLater = 1013,
    /// Bad gateway (1014).
    BadGateway = 1014,
    /// TLS handshake failure (1015).
    TlsHandshake = 1015,
}

impl CloseCode {
    /// Convert from a u16 code.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::Protocol),
            1003 => Some(Self::Unsupported),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::Abnormal),
            1007 => Some(Self::InvalidPayload),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1010 => Some(Self::ExtensionRequired),
            1011 => Some(Self::InternalError),
            1012 => Some(Self::ServiceRestart),
            1013 => Some(Self::TryAgainLater),
            1014 => Some(Self::BadGateway),
            1015 => Some(Self::TlsHandshake),
            _ => None,
        }
    }

    /// Get the u16 value of this close code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Protocol => "Protocol",
            Self::Unsupported => "Unsupported",
            Self::NoStatus => "NoStatus",
            Self::Abnormal => "Abnormal",
            Self::InvalidPayload => "InvalidPayload",
            Self::PolicyViolation => "PolicyViolation",
            Self::MessageTooBig => "MessageTooBig",
            Self::ExtensionRequired => "ExtensionRequired",
            Self::InternalError => "InternalError",
            Self::ServiceRestart => "ServiceRestart",
            Self::TryAgainLater => "TryAgainLater",
            Self::BadGateway => "BadGateway",
            Self::TlsHandshake => "TlsHandshake",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}
