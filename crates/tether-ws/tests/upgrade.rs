//! End-to-end upgrade tests against a real hyper server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::{header, HeaderValue, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tether_test::{recorder, Recorder, Recording, TestResponse};
use tether_ws::{Endpoint, Outbound, Peer, SocketConfig, SocketEntry, SocketHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};

const WAIT: Duration = Duration::from_secs(3);

#[derive(Clone)]
struct Taps {
    connected: Recorder<(Peer, Outbound)>,
    received: Recorder<Bytes>,
    closed: Recorder<Peer>,
}

struct Recordings {
    connected: Recording<(Peer, Outbound)>,
    received: Recording<Bytes>,
    closed: Recording<Peer>,
}

fn taps() -> (Taps, Recordings) {
    let (connected, connected_rec) = recorder();
    let (received, received_rec) = recorder();
    let (closed, closed_rec) = recorder();
    (
        Taps {
            connected,
            received,
            closed,
        },
        Recordings {
            connected: connected_rec,
            received: received_rec,
            closed: closed_rec,
        },
    )
}

struct RecordingHandler {
    endpoint: Endpoint,
    taps: Taps,
}

impl SocketHandler<Incoming> for RecordingHandler {
    fn endpoint(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    async fn handle(&mut self, mut request: Request<Incoming>) -> Response<Full<Bytes>> {
        if !self.endpoint.is_upgrade() {
            return Response::new(Full::new(Bytes::from_static(b"page")));
        }

        let Taps {
            connected,
            received,
            closed,
        } = self.taps.clone();

        self.endpoint
            .on_connected(move |peer, outbound| connected.record((*peer, outbound)))
            .on_received(move |_, payload| received.record(payload))
            .on_closed(move |peer| closed.record(*peer));

        self.endpoint.listen_and_serve(&mut request)
    }
}

async fn serve(entry: SocketEntry, taps: Taps) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, remote)) = listener.accept().await {
            let entry = entry.clone();
            let taps = taps.clone();

            tokio::spawn(async move {
                let service = service_fn(move |mut request: Request<Incoming>| {
                    let entry = entry.clone();
                    let handler = RecordingHandler {
                        endpoint: Endpoint::new(),
                        taps: taps.clone(),
                    };
                    async move {
                        request.extensions_mut().insert(remote);
                        Ok::<_, Infallible>(entry.dispatch(request, handler).await)
                    }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await;
            });
        }
    });

    addr
}

fn client_request(addr: SocketAddr, origin: &str) -> tungstenite::handshake::client::Request {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
    request
}

#[tokio::test]
async fn same_origin_client_exchanges_messages() {
    let (taps, mut rec) = taps();
    let addr = serve(SocketEntry::new(SocketConfig::default()), taps).await;

    let (mut ws, response) = connect_async(client_request(addr, &format!("http://{addr}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    let (peer, outbound) = rec.connected.next(WAIT).await.unwrap();
    let remote = peer.remote_addr().expect("remote address recorded");
    assert!(remote.ip().is_loopback());

    ws.send(Message::text("ping-test")).await.unwrap();
    assert_eq!(
        rec.received.next(WAIT).await.unwrap(),
        Bytes::from_static(b"ping-test")
    );

    outbound.send("pong").await.unwrap();
    let reply = tokio::time::timeout(WAIT, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply, Message::text("pong"));

    ws.close(None).await.unwrap();
    while let Ok(Some(Ok(_))) = tokio::time::timeout(WAIT, ws.next()).await {}

    assert_eq!(rec.closed.next(WAIT).await.unwrap(), peer);
    assert!(outbound.is_closed());
}

#[tokio::test]
async fn server_disconnect_reaches_client() {
    let (taps, mut rec) = taps();
    let addr = serve(SocketEntry::default(), taps).await;

    let (mut ws, _) = connect_async(client_request(addr, &format!("https://{addr}")))
        .await
        .unwrap();
    let (_, outbound) = rec.connected.next(WAIT).await.unwrap();

    outbound.disconnect(4000u16);

    let frame = loop {
        match tokio::time::timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    assert_eq!(frame.map(|f| u16::from(f.code)), Some(4000));
    rec.closed.next(WAIT).await.unwrap();
}

#[tokio::test]
async fn cross_origin_client_is_forbidden() {
    let (taps, mut rec) = taps();
    let addr = serve(SocketEntry::default(), taps).await;

    let err = connect_async(client_request(addr, "http://evil.example"))
        .await
        .unwrap_err();

    match err {
        tungstenite::Error::Http(response) => {
            let response = response.map(|body| Full::new(Bytes::from(body.unwrap_or_default())));
            TestResponse::from_http(response)
                .await
                .unwrap()
                .assert_status(StatusCode::FORBIDDEN)
                .assert_header("content-type", "text/plain; charset=utf-8");
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
    rec.connected.expect_quiet(Duration::from_millis(100)).await.unwrap();
}

#[tokio::test]
async fn plain_request_passes_through_to_handler() {
    let (taps, mut rec) = taps();
    let addr = serve(SocketEntry::default(), taps).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut raw = String::new();
    tokio::time::timeout(WAIT, stream.read_to_string(&mut raw))
        .await
        .unwrap()
        .unwrap();

    assert!(raw.starts_with("HTTP/1.1 200"), "unexpected response: {raw}");
    assert!(raw.ends_with("page"));
    rec.connected.expect_quiet(Duration::from_millis(100)).await.unwrap();
}
