//! Tether echo server.
//!
//! Serves one WebSocket route that echoes every message back to its sender,
//! and a small HTML page with a browser client on the same path.
//!
//! ```text
//! cargo run -p tether-echo
//! TETHER__SERVER__HTTP_ADDR=127.0.0.1:9000 TETHER__LOGGING__FORMAT=pretty cargo run -p tether-echo
//! ```

mod registry;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tether_config::ConfigLoader;
use tether_telemetry::{init_logging, init_metrics};
use tether_ws::{Endpoint, SocketEntry, SocketHandler};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::registry::Registry;

const CLIENT_PAGE: &str = r#"<!doctype html>
<html>
<body>
<input id="msg" value="ping-test"><button id="send">send</button>
<pre id="log"></pre>
<script>
const log = (line) => document.getElementById("log").textContent += line + "\n";
const ws = new WebSocket(location.href.replace(/^http/, "ws"));
ws.onopen = () => log("open");
ws.onmessage = (e) => log("< " + e.data);
ws.onclose = (e) => log("closed " + e.code);
document.getElementById("send").onclick = () => {
  const text = document.getElementById("msg").value;
  ws.send(text);
  log("> " + text);
};
</script>
</body>
</html>
"#;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct App {
    entry: SocketEntry,
    registry: Registry,
    ws_path: String,
}

/// Echoes every message back through the registry.
struct EchoHandler {
    endpoint: Endpoint,
    registry: Registry,
}

impl SocketHandler<Incoming> for EchoHandler {
    fn endpoint(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    async fn handle(&mut self, mut request: Request<Incoming>) -> Response<Full<Bytes>> {
        if !self.endpoint.is_upgrade() {
            return text(StatusCode::OK, "text/html; charset=utf-8", CLIENT_PAGE);
        }

        if let Some(ctx) = self.endpoint.context() {
            debug!(request_id = %ctx.request_id(), path = ctx.path(), "accepting echo client");
        }

        let (connected, received, closed) = (
            self.registry.clone(),
            self.registry.clone(),
            self.registry.clone(),
        );
        self.endpoint
            .on_connected(move |peer, outbound| connected.connected(peer, outbound))
            .on_received(move |peer, payload| received.echo(peer, payload))
            .on_closed(move |peer| closed.closed(peer));

        self.endpoint.listen_and_serve(&mut request)
    }
}

fn text(status: StatusCode, content_type: &'static str, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
}

async fn route(app: Arc<App>, mut request: Request<Incoming>, remote: SocketAddr) -> Response<Full<Bytes>> {
    request.extensions_mut().insert(remote);

    if request.uri().path() != app.ws_path {
        return text(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "not found");
    }

    let handler = EchoHandler {
        endpoint: Endpoint::new(),
        registry: app.registry.clone(),
    };
    app.entry.dispatch(request, handler).await
}

async fn serve_connection(app: Arc<App>, stream: TcpStream, remote: SocketAddr) -> Result<(), hyper::Error> {
    let service = service_fn(move |request: Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(route(app, request, remote).await) }
    });

    http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .with_optional_file("tether.toml")?
        .with_dotenv()?
        .with_env_prefix("TETHER")
        .load()
        .context("loading configuration")?;

    init_logging(&config.logging.to_log_config())?;
    init_metrics(&config.metrics.to_metrics_config())?;

    let addr: SocketAddr = config
        .server
        .http_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.http_addr))?;

    let app = Arc::new(App {
        entry: SocketEntry::new(config.socket.to_socket_config()),
        registry: Registry::default(),
        ws_path: config.server.ws_path.clone(),
    });

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, path = %app.ws_path, "echo server listening");

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote)) => {
                    let app = Arc::clone(&app);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(app, stream, remote).await {
                            debug!(%remote, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "failed to accept connection"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!(active = app.registry.len(), "shutdown signal received");
                break;
            }
        }
    }

    app.registry.disconnect_all();

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while !app.registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_err() {
        warn!(active = app.registry.len(), "connections still open at shutdown");
    }

    info!("echo server stopped");
    Ok(())
}
