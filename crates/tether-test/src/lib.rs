//! # Tether Test
//!
//! Test utilities for Tether, covering WebSocket connections end to end
//! without binding a port.
//!
//! ## Key Features
//!
//! - **In-memory pairs**: [`socket_pair`] connects a server-role and a
//!   client-role stream over a duplex pipe.
//! - **Scripted peer**: [`TestPeer`] drives the client side with every
//!   operation bounded by a timeout.
//! - **Upgrade requests**: [`UpgradeRequest`] builds valid or deliberately
//!   broken upgrade requests.
//! - **Callback capture**: [`recorder`] hands out a cloneable [`Recorder`] for
//!   callbacks that run on connection tasks.
//!
//! ## Example
//!
//! ```ignore
//! use tether_test::{recorder, socket_pair, TestPeer};
//! use tether_ws::{lifecycle, Callbacks, Peer, SocketConfig};
//!
//! #[tokio::test]
//! async fn echoes() {
//!     let (server, client) = socket_pair(None).await;
//!     let (received, mut messages) = recorder();
//!
//!     let callbacks = Callbacks::new().on_received(move |_, payload| received.record(payload));
//!     let handle = lifecycle::start(server, Peer::new(None), &SocketConfig::default(), callbacks);
//!
//!     let mut peer = TestPeer::new(client);
//!     peer.send_text("ping-test").await.unwrap();
//!     assert_eq!(messages.next(Duration::from_secs(1)).await.unwrap(), "ping-test");
//!
//!     handle.disconnect(1000u16);
//!     assert_eq!(peer.expect_close().await.unwrap(), Some(1000));
//! }
//! ```

#![forbid(unsafe_code)]

mod error;
mod peer;
mod recorder;
mod request;
mod response;

pub use error::TestError;
pub use peer::{socket_pair, TestPeer, DEFAULT_PEER_TIMEOUT, DUPLEX_BUFFER};
pub use recorder::{recorder, Recorder, Recording};
pub use request::{UpgradeRequest, SAMPLE_ACCEPT, SAMPLE_KEY};
pub use response::TestResponse;
