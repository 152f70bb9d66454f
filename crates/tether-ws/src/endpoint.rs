//! The per-request upgrade capability.
//!
//! A socket handler embeds an [`Endpoint`]. The entry adapter initialises
//! it for eligible requests; the handler then registers its callbacks and
//! calls [`Endpoint::listen_and_serve`] to upgrade and start the connection.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use tracing::warn;

use crate::config::SocketConfig;
use crate::context::RequestContext;
use crate::lifecycle::{self, Callbacks};
use crate::negotiate::negotiate;
use crate::socket::{Outbound, Peer};

/// Configuration, request context and callbacks for one upgrade.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    config: Option<Arc<SocketConfig>>,
    context: Option<RequestContext>,
    callbacks: Callbacks,
}

impl Endpoint {
    /// An endpoint that has not been initialised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise for an eligible request. Callbacks are reset to no-ops.
    pub fn init(&mut self, config: Arc<SocketConfig>, context: RequestContext) {
        self.config = Some(config);
        self.context = Some(context);
        self.callbacks = Callbacks::default();
    }

    /// Whether the entry adapter initialised this endpoint, which it only
    /// does for upgrade candidates.
    pub fn is_upgrade(&self) -> bool {
        self.config.is_some()
    }

    /// The context of the request being upgraded.
    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    /// Set the callback run once the connection is open.
    pub fn on_connected<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Peer, Outbound) + Send + Sync + 'static,
    {
        self.callbacks = std::mem::take(&mut self.callbacks).on_connected(f);
        self
    }

    /// Set the callback run for every received payload.
    pub fn on_received<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Peer, Bytes) + Send + Sync + 'static,
    {
        self.callbacks = std::mem::take(&mut self.callbacks).on_received(f);
        self
    }

    /// Set the callback run after the connection is closed.
    pub fn on_closed<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Peer) + Send + Sync + 'static,
    {
        self.callbacks = std::mem::take(&mut self.callbacks).on_closed(f);
        self
    }

    /// Negotiate the upgrade and start the connection lifecycle.
    ///
    /// Returns the response to send: `101 Switching Protocols` on success, a
    /// plain-text rejection otherwise. The lifecycle starts on a spawned task
    /// once the protocol switch completes, so this never waits on the
    /// connection. Must be called inside a Tokio runtime.
    pub fn listen_and_serve<B>(&mut self, request: &mut Request<B>) -> Response<Full<Bytes>> {
        let config = self
            .config
            .clone()
            .unwrap_or_else(|| Arc::new(SocketConfig::default()));

        let negotiated = match negotiate(request, &config) {
            Ok(negotiated) => negotiated,
            Err(err) => return err.into_response(),
        };

        let callbacks = self.callbacks.clone();
        let peer = negotiated.peer;
        let upgrade = negotiated.upgrade;

        tokio::spawn(async move {
            match upgrade.complete().await {
                Ok(stream) => {
                    lifecycle::start(stream, peer, &config, callbacks);
                }
                Err(err) => warn!(peer = %peer, error = %err, "upgrade did not complete"),
            }
        });

        negotiated.response
    }
}
