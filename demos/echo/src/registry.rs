//! Live connections, maintained by the lifecycle callbacks.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tether_ws::{CloseCode, ConnectionId, Outbound, Peer, SendError};
use tracing::{debug, warn};

/// Outbound handles keyed by connection.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    connections: Arc<DashMap<ConnectionId, Outbound>>,
}

impl Registry {
    /// Track a newly opened connection.
    pub fn connected(&self, peer: &Peer, outbound: Outbound) {
        self.connections.insert(peer.id(), outbound);
        debug!(peer = %peer, active = self.len(), "registered connection");
    }

    /// Send `payload` back to the peer it came from.
    pub fn echo(&self, peer: &Peer, payload: Bytes) {
        let Some(outbound) = self.connections.get(&peer.id()) else {
            return;
        };

        match outbound.try_send(payload) {
            Ok(()) => {}
            Err(SendError::Full) => warn!(peer = %peer, "outbound queue full, dropping echo"),
            Err(SendError::Closed) => debug!(peer = %peer, "connection closing, dropping echo"),
        }
    }

    /// Forget a closed connection.
    pub fn closed(&self, peer: &Peer) {
        self.connections.remove(&peer.id());
        debug!(peer = %peer, active = self.len(), "unregistered connection");
    }

    /// Ask every live connection to close with `1001 Going Away`.
    pub fn disconnect_all(&self) {
        for entry in self.connections.iter() {
            entry.value().disconnect(CloseCode::GoingAway);
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_test::{socket_pair, TestPeer};
    use tether_ws::{lifecycle, Callbacks, SocketConfig};

    fn callbacks(registry: &Registry) -> Callbacks {
        let (on_connected, on_received, on_closed) =
            (registry.clone(), registry.clone(), registry.clone());
        Callbacks::new()
            .on_connected(move |peer, outbound| on_connected.connected(peer, outbound))
            .on_received(move |peer, payload| on_received.echo(peer, payload))
            .on_closed(move |peer| on_closed.closed(peer))
    }

    #[tokio::test]
    async fn test_echo_and_unregister() {
        let registry = Registry::default();
        let (server, client) = socket_pair(None).await;

        let handle = lifecycle::start(
            server,
            Peer::new(None),
            &SocketConfig::default(),
            callbacks(&registry),
        );
        assert_eq!(registry.len(), 1);

        let mut peer = TestPeer::new(client);
        peer.send_text("hello").await.unwrap();
        assert_eq!(peer.recv_data().await.unwrap(), Bytes::from_static(b"hello"));

        registry.disconnect_all();
        assert_eq!(peer.expect_close().await.unwrap(), Some(1001));
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(3), handle.closed()).await.unwrap(),
            Some(1001)
        );

        // The close callback runs just after completion is published.
        tokio::time::timeout(Duration::from_secs(3), async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_echo_to_unknown_peer_is_ignored() {
        let registry = Registry::default();
        registry.echo(&Peer::new(None), Bytes::from_static(b"lost"));
        assert!(registry.is_empty());
    }
}
