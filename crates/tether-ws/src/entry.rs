//! The entry adapter between a host server and socket handlers.
//!
//! A host creates one [`SocketEntry`] and, per request, a fresh handler.
//! [`SocketEntry::dispatch`] initialises the handler's [`Endpoint`] when the
//! request is an upgrade candidate and then hands the request to the handler
//! either way.
//!
//! # Example
//!
//! ```ignore
//! struct Chat { endpoint: Endpoint }
//!
//! impl SocketHandler<Incoming> for Chat {
//!     fn endpoint(&mut self) -> &mut Endpoint {
//!         &mut self.endpoint
//!     }
//!
//!     async fn handle(&mut self, mut req: Request<Incoming>) -> Response<Full<Bytes>> {
//!         if !self.endpoint.is_upgrade() {
//!             return page();
//!         }
//!         self.endpoint
//!             .on_received(|peer, payload| tracing::info!(%peer, len = payload.len()))
//!             .listen_and_serve(&mut req)
//!     }
//! }
//!
//! let entry = SocketEntry::new(SocketConfig::default());
//! let response = entry.dispatch(req, Chat { endpoint: Endpoint::new() }).await;
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use tracing::debug;

use crate::config::SocketConfig;
use crate::context::RequestContext;
use crate::endpoint::Endpoint;
use crate::negotiate::is_upgrade_request;

/// A request handler that can take over upgrade requests.
///
/// The capability set is: construction through [`init`](Self::init),
/// connect/receive/close hooks through its [`Endpoint`], and ordinary
/// request handling through [`handle`](Self::handle). A type that does not
/// implement this trait cannot be passed to [`SocketEntry::dispatch`].
pub trait SocketHandler<B>: Send {
    /// The handler's endpoint.
    fn endpoint(&mut self) -> &mut Endpoint;

    /// Prepare for an upgrade request.
    fn init(&mut self, config: Arc<SocketConfig>, context: RequestContext) {
        self.endpoint().init(config, context);
    }

    /// Handle the request; upgrade candidates arrive after [`init`](Self::init).
    fn handle(&mut self, request: Request<B>) -> impl Future<Output = Response<Full<Bytes>>> + Send;
}

/// Routes requests into socket handlers with a shared configuration.
#[derive(Debug, Clone)]
pub struct SocketEntry {
    config: Arc<SocketConfig>,
}

impl Default for SocketEntry {
    fn default() -> Self {
        Self::new(SocketConfig::default())
    }
}

impl SocketEntry {
    /// Create an entry point. Zero-valued tunables fall back to defaults.
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config: Arc::new(config.prepare()),
        }
    }

    /// The prepared configuration.
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Dispatch one request to `handler`.
    pub async fn dispatch<B, H>(&self, request: Request<B>, mut handler: H) -> Response<Full<Bytes>>
    where
        H: SocketHandler<B>,
    {
        if is_upgrade_request(&request) {
            debug!(path = request.uri().path(), "upgrade candidate");
            handler.init(Arc::clone(&self.config), RequestContext::from_request(&request));
        } else {
            debug!(path = request.uri().path(), "not an upgrade request, passing through");
        }

        handler.handle(request).await
    }
}
