//! WebSocket upgrade negotiation.
//!
//! A request is an upgrade candidate when it is a `GET` whose `Origin`
//! header names the request's own host over `http` or `https`. Eligible
//! requests are then checked for the RFC 6455 handshake headers and
//! answered with `101 Switching Protocols`; the protocol switch itself
//! completes through [`PendingUpgrade::complete`] once that response has
//! been sent.

use base64::Engine;
use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, instrument, warn};
use tungstenite::protocol::{Role, WebSocketConfig};

use crate::config::SocketConfig;
use crate::context::{remote_addr, request_host, request_origin};
use crate::error::NegotiationError;
use crate::socket::Peer;
use tether_telemetry::metrics::record_negotiation;

/// The WebSocket magic GUID used in the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// A WebSocket stream over an upgraded hyper connection.
pub type UpgradedStream = WebSocketStream<TokioIo<Upgraded>>;

/// Check if a request is an upgrade candidate.
///
/// Requires `GET` and an allowed origin. Anything else, including a missing
/// or non-UTF-8 `Origin` or `Host`, is simply not a candidate.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    request.method() == Method::GET && origin_allowed(request)
}

/// Check whether the request's `Origin` is `http(s)://<host>` for its own host.
pub fn origin_allowed<B>(request: &Request<B>) -> bool {
    match (request_origin(request), request_host(request)) {
        (Some(origin), Some(host)) => origin_matches(origin, host),
        _ => false,
    }
}

/// Match an origin against `http://<host>` or `https://<host>` exactly.
pub fn origin_matches(origin: &str, host: &str) -> bool {
    origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .is_some_and(|rest| rest == host)
}

fn has_upgrade_header<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

fn has_websocket_upgrade<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn has_websocket_version<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::SEC_WEBSOCKET_VERSION)
        .is_some_and(|v| v.as_bytes() == b"13")
}

fn websocket_key<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Compute the `Sec-WebSocket-Accept` value from the client's key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

fn switching_protocols(accept_key: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept_key)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

/// A successfully negotiated upgrade.
#[derive(Debug)]
pub struct Negotiated {
    /// The `101 Switching Protocols` response to send to the client.
    pub response: Response<Full<Bytes>>,
    /// Completes the protocol switch after the response is sent.
    pub upgrade: PendingUpgrade,
    /// Identity of the connection being established.
    pub peer: Peer,
}

/// The second half of an upgrade: waits for hyper to hand over the connection.
#[derive(Debug)]
pub struct PendingUpgrade {
    on_upgrade: OnUpgrade,
    stream_config: WebSocketConfig,
}

impl PendingUpgrade {
    /// Wait for the protocol switch and wrap the connection as a WebSocket.
    ///
    /// Resolves only after the `101` response has been written, so the caller
    /// must return that response first (typically by spawning this).
    pub async fn complete(self) -> Result<UpgradedStream, NegotiationError> {
        let upgraded = self.on_upgrade.await.map_err(|e| {
            warn!(error = %e, "WebSocket protocol switch failed");
            NegotiationError::upgrade_failed(e.to_string())
        })?;

        Ok(WebSocketStream::from_raw_socket(
            TokioIo::new(upgraded),
            Role::Server,
            Some(self.stream_config),
        )
        .await)
    }
}

/// Negotiate a WebSocket upgrade for `request`.
///
/// Checks, in order: method (405), origin (403), handshake headers (400) and
/// availability of the connection upgrade (400, generic message). The
/// upgrade hook is taken out of the request extensions on success.
#[instrument(skip_all, fields(remote = tracing::field::Empty, host = tracing::field::Empty))]
pub fn negotiate<B>(
    request: &mut Request<B>,
    config: &SocketConfig,
) -> Result<Negotiated, NegotiationError> {
    let remote = remote_addr(request);
    let host = request_host(request).map(str::to_owned);
    let span = tracing::Span::current();
    if let Some(remote) = remote {
        span.record("remote", tracing::field::display(remote));
    }
    if let Some(host) = host.as_deref() {
        span.record("host", host);
    }

    let result = validate(request, config).map(|(response, upgrade)| Negotiated {
        response,
        upgrade,
        peer: Peer::new(remote),
    });

    match &result {
        Ok(negotiated) => {
            info!(peer = %negotiated.peer, "WebSocket upgrade accepted");
            record_negotiation(StatusCode::SWITCHING_PROTOCOLS.as_u16());
        }
        Err(err) => {
            warn!(status = err.status().as_u16(), error = %err, "WebSocket upgrade rejected");
            record_negotiation(err.status().as_u16());
        }
    }

    result
}

fn validate<B>(
    request: &mut Request<B>,
    config: &SocketConfig,
) -> Result<(Response<Full<Bytes>>, PendingUpgrade), NegotiationError> {
    if request.method() != Method::GET {
        return Err(NegotiationError::MethodNotAllowed(request.method().clone()));
    }

    if !origin_allowed(request) {
        return Err(NegotiationError::OriginForbidden {
            origin: request_origin(request).map(str::to_owned),
            host: request_host(request).map(str::to_owned),
        });
    }

    if !has_upgrade_header(request) {
        return Err(NegotiationError::handshake_failed(
            "missing Connection: Upgrade header",
        ));
    }

    if !has_websocket_upgrade(request) {
        return Err(NegotiationError::handshake_failed(
            "missing Upgrade: websocket header",
        ));
    }

    if !has_websocket_version(request) {
        return Err(NegotiationError::handshake_failed(
            "missing or unsupported Sec-WebSocket-Version (must be 13)",
        ));
    }

    let accept_key = websocket_key(request)
        .map(compute_accept_key)
        .ok_or_else(|| NegotiationError::handshake_failed("missing Sec-WebSocket-Key header"))?;

    let on_upgrade = request
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or_else(|| NegotiationError::upgrade_failed("connection cannot be upgraded"))?;

    debug!("handshake headers valid");

    Ok((
        switching_protocols(&accept_key),
        PendingUpgrade {
            on_upgrade,
            stream_config: config.stream_config(),
        },
    ))
}
