//! Request context types.
//!
//! A [`RequestContext`] is captured from the inbound request before it is
//! handed to a socket handler, so the handler can see who asked for the
//! upgrade without holding on to the request itself.

use std::net::SocketAddr;

use http::{header, Request};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// # Example
///
/// ```
/// use tether_ws::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-request context handed to a socket handler's `init` hook.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    remote_addr: Option<SocketAddr>,
    host: Option<String>,
    origin: Option<String>,
    path: String,
}

impl RequestContext {
    /// Captures the context of an inbound request.
    ///
    /// The remote address is read from the request extensions, where the
    /// server inserts it when accepting the connection.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            request_id: RequestId::new(),
            remote_addr: remote_addr(request),
            host: request_host(request).map(str::to_owned),
            origin: request_origin(request).map(str::to_owned),
            path: request.uri().path().to_owned(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the remote address of the client, if the server recorded one.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns the target host of the request.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the declared origin of the request.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The remote address recorded in the request extensions.
pub(crate) fn remote_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request.extensions().get::<SocketAddr>().copied()
}

/// The target host: the `Host` header, or the URI authority for
/// absolute-form requests.
pub(crate) fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(http::uri::Authority::as_str))
}

pub(crate) fn request_origin<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_context_from_request() {
        let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
        let mut request = Request::builder()
            .uri("/ws/chat?room=1")
            .header(header::HOST, "chat.example:8080")
            .header(header::ORIGIN, "https://chat.example:8080")
            .body(())
            .unwrap();
        request.extensions_mut().insert(addr);

        let ctx = RequestContext::from_request(&request);
        assert_eq!(ctx.remote_addr(), Some(addr));
        assert_eq!(ctx.host(), Some("chat.example:8080"));
        assert_eq!(ctx.origin(), Some("https://chat.example:8080"));
        assert_eq!(ctx.path(), "/ws/chat");
    }

    #[test]
    fn test_host_falls_back_to_authority() {
        let request = Request::builder()
            .uri("http://chat.example/ws")
            .body(())
            .unwrap();

        let ctx = RequestContext::from_request(&request);
        assert_eq!(ctx.host(), Some("chat.example"));
        assert_eq!(ctx.origin(), None);
        assert_eq!(ctx.remote_addr(), None);
    }
}
