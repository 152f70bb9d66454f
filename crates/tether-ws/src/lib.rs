//! WebSocket connection lifecycle for hyper servers.
//!
//! This crate takes a single WebSocket connection from the HTTP upgrade
//! through to teardown:
//!
//! - **Negotiation**: same-origin `GET` requests are upgraded per RFC 6455;
//!   other requests fall through to ordinary handling.
//! - **Concurrent loops**: every connection runs a write loop, a read loop and
//!   a disconnect watcher as separate tasks that only share channels.
//! - **Heartbeats**: the write loop pings the peer, and any frame from the
//!   peer pushes the read deadline forward.
//! - **Single teardown**: whichever loop fails first, or an explicit
//!   disconnect, leads to exactly one close sequence and one `on_closed` call.
//!
//! # Example
//!
//! ```ignore
//! use tether_ws::{Endpoint, SocketConfig, SocketEntry, SocketHandler};
//!
//! struct Echo {
//!     endpoint: Endpoint,
//! }
//!
//! impl SocketHandler<Incoming> for Echo {
//!     fn endpoint(&mut self) -> &mut Endpoint {
//!         &mut self.endpoint
//!     }
//!
//!     async fn handle(&mut self, mut req: Request<Incoming>) -> Response<Full<Bytes>> {
//!         if !self.endpoint.is_upgrade() {
//!             return not_found();
//!         }
//!         self.endpoint
//!             .on_connected(|peer, outbound| registry.insert(peer.id(), outbound))
//!             .on_received(|peer, payload| echo(peer, payload))
//!             .on_closed(|peer| registry.remove(&peer.id()))
//!             .listen_and_serve(&mut req)
//!     }
//! }
//!
//! let entry = SocketEntry::new(SocketConfig::default());
//! // inside a hyper service_fn:
//! entry.dispatch(req, Echo { endpoint: Endpoint::new() }).await
//! ```
//!
//! # Architecture
//!
//! ```text
//!  Request ──► SocketEntry::dispatch ──► SocketHandler::init (upgrade candidates)
//!                                               │
//!                                               ▼
//!                                 Endpoint::listen_and_serve ──► negotiate ──► 101
//!                                               │
//!                                               ▼ (spawned, after 101 is sent)
//!                         PendingUpgrade::complete ──► lifecycle::start
//!                                                        │
//!                               ┌────────────────────────┼──────────────────────┐
//!                               ▼                        ▼                      ▼
//!                           WriteLoop                ReadLoop           DisconnectWatcher
//!                      (queue + heartbeat)      (on_received, deadline)   (close, on_closed)
//! ```

pub mod config;
pub mod context;
pub mod endpoint;
pub mod entry;
pub mod error;
pub mod lifecycle;
pub mod negotiate;
pub mod socket;

pub use config::SocketConfig;
pub use context::{RequestContext, RequestId};
pub use endpoint::Endpoint;
pub use entry::{SocketEntry, SocketHandler};
pub use error::{CloseCode, NegotiationError, SendError, SocketError};
pub use lifecycle::{start, Callbacks, OnConnected};
pub use negotiate::{
    compute_accept_key, is_upgrade_request, negotiate, Negotiated, PendingUpgrade, UpgradedStream,
};
pub use socket::{
    ConnectionHandle, ConnectionId, DisconnectWatcher, OnClosed, OnReceived, Outbound, Peer,
    ReadLoop, Socket, WriteLoop,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports() {
        // Verify all public types are accessible
        let _config = SocketConfig::default();
        let _entry = SocketEntry::default();
        let _endpoint = Endpoint::new();
        let _callbacks = Callbacks::new();
        let _id = ConnectionId::new();
        let _peer = Peer::new(None);
        let _close = CloseCode::Normal;
    }
}
