//! Upgrade request building.

use std::net::SocketAddr;

use http::{header, HeaderName, HeaderValue, Method, Request};

/// The sample `Sec-WebSocket-Key` from RFC 6455.
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// The `Sec-WebSocket-Accept` value matching [`SAMPLE_KEY`].
pub const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

/// Builder for WebSocket upgrade requests.
///
/// Starts out as a valid same-origin upgrade for the given host; each method
/// breaks or changes one part of it.
///
/// # Example
///
/// ```
/// use tether_test::UpgradeRequest;
///
/// let request = UpgradeRequest::new("localhost:8080")
///     .origin("https://evil.example")
///     .build();
/// assert_eq!(request.headers()["origin"], "https://evil.example");
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    method: Method,
    uri: String,
    host: String,
    headers: Vec<(HeaderName, Option<String>)>,
    remote: Option<SocketAddr>,
}

impl UpgradeRequest {
    /// A valid upgrade request for `host` with origin `http://<host>`.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            method: Method::GET,
            uri: "/ws".to_string(),
            headers: vec![
                (header::ORIGIN, Some(format!("http://{host}"))),
                (header::CONNECTION, Some("Upgrade".to_string())),
                (header::UPGRADE, Some("websocket".to_string())),
                (header::SEC_WEBSOCKET_KEY, Some(SAMPLE_KEY.to_string())),
                (header::SEC_WEBSOCKET_VERSION, Some("13".to_string())),
            ],
            host,
            remote: None,
        }
    }

    /// Sets the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Sets the `Origin` header.
    pub fn origin(self, origin: impl Into<String>) -> Self {
        self.set(header::ORIGIN, Some(origin.into()))
    }

    /// Removes the `Origin` header.
    pub fn without_origin(self) -> Self {
        self.set(header::ORIGIN, None)
    }

    /// Removes the `Sec-WebSocket-Key` header.
    pub fn without_key(self) -> Self {
        self.set(header::SEC_WEBSOCKET_KEY, None)
    }

    /// Sets the `Sec-WebSocket-Version` header.
    pub fn version(self, version: impl Into<String>) -> Self {
        self.set(header::SEC_WEBSOCKET_VERSION, Some(version.into()))
    }

    /// Sets or removes any header.
    pub fn set(mut self, name: HeaderName, value: Option<String>) -> Self {
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value));
        self
    }

    /// Records the client address in the request extensions, as a server would.
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote = Some(addr);
        self
    }

    /// Builds the request with an empty body.
    pub fn build(self) -> Request<()> {
        self.build_with(())
    }

    /// Builds the request with the given body.
    pub fn build_with<B>(self, body: B) -> Request<B> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .header(header::HOST, self.host);

        for (name, value) in self.headers {
            if let Some(value) = value {
                let value = HeaderValue::try_from(value).expect("valid header value");
                builder = builder.header(name, value);
            }
        }

        let mut request = builder.body(body).expect("valid request");
        if let Some(addr) = self.remote {
            request.extensions_mut().insert(addr);
        }
        request
    }
}
