//! In-memory transport
//!
//! [`MemoryConnector::pair`] returns a connector for the session and a
//! [`MemoryServer`] that plays the remote platform: it accepts connections,
//! reads what the session sent and pushes frames, errors and closes back.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{ChannelEndpoint, Connection, Connector, Frame, TransportError};

struct Shared {
    /// Scripted connect failures, optionally bound to a subprotocol
    failures: VecDeque<(Option<String>, TransportError)>,
    attempts: HashMap<String, usize>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Session side of the in-memory transport
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryServer) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            failures: VecDeque::new(),
            attempts: HashMap::new(),
            peers: peers_tx,
        }));

        (
            MemoryConnector {
                shared: shared.clone(),
            },
            MemoryServer {
                shared,
                peers: peers_rx,
                parked: VecDeque::new(),
            },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        endpoint: &ChannelEndpoint,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let mut shared = self.shared.lock();
        *shared
            .attempts
            .entry(endpoint.subprotocol.clone())
            .or_default() += 1;

        let scripted = shared.failures.iter().position(|(filter, _)| {
            filter
                .as_deref()
                .map_or(true, |subprotocol| subprotocol == endpoint.subprotocol)
        });
        if let Some(index) = scripted {
            if let Some((_, error)) = shared.failures.remove(index) {
                return Err(error);
            }
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            endpoint: endpoint.clone(),
            to_client,
            from_client,
        };
        shared
            .peers
            .send(peer)
            .map_err(|_| TransportError::Connect("connection refused".to_string()))?;

        Ok(Box::new(MemoryConnection {
            to_server: Some(to_server),
            from_server,
            closed: false,
        }))
    }
}

enum Inbound {
    Frame(Frame),
    Error(String),
    Close,
}

struct MemoryConnection {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<Inbound>,
    closed: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let sender = self.to_server.as_ref().ok_or(TransportError::Closed)?;
        sender.send(text).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        if self.closed {
            return None;
        }
        match self.from_server.recv().await {
            Some(Inbound::Frame(frame)) => Some(Ok(frame)),
            Some(Inbound::Error(message)) => Some(Err(TransportError::Receive(message))),
            Some(Inbound::Close) | None => {
                self.closed = true;
                self.to_server = None;
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.to_server = None;
        Ok(())
    }
}

/// Remote side of the in-memory transport
pub struct MemoryServer {
    shared: Arc<Mutex<Shared>>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
    /// Accepted peers not yet claimed by `accept_on`
    parked: VecDeque<MemoryPeer>,
}

impl MemoryServer {
    /// Make the next connect attempt on any channel fail
    pub fn fail_next(&self, error: TransportError) {
        self.shared.lock().failures.push_back((None, error));
    }

    /// Make the next connect attempt using `subprotocol` fail
    pub fn fail_next_on(&self, subprotocol: &str, error: TransportError) {
        self.shared
            .lock()
            .failures
            .push_back((Some(subprotocol.to_string()), error));
    }

    /// Connect attempts so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.shared.lock().attempts.values().sum()
    }

    pub fn attempts_on(&self, subprotocol: &str) -> usize {
        self.shared
            .lock()
            .attempts
            .get(subprotocol)
            .copied()
            .unwrap_or(0)
    }

    /// Next accepted connection, in connect order
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        match self.parked.pop_front() {
            Some(peer) => Some(peer),
            None => self.peers.recv().await,
        }
    }

    /// Next accepted connection that negotiated `subprotocol`
    pub async fn accept_on(&mut self, subprotocol: &str) -> Option<MemoryPeer> {
        if let Some(index) = self
            .parked
            .iter()
            .position(|peer| peer.endpoint.subprotocol == subprotocol)
        {
            return self.parked.remove(index);
        }
        loop {
            let peer = self.peers.recv().await?;
            if peer.endpoint.subprotocol == subprotocol {
                return Some(peer);
            }
            self.parked.push_back(peer);
        }
    }
}

/// One accepted connection, seen from the remote side
pub struct MemoryPeer {
    endpoint: ChannelEndpoint,
    to_client: mpsc::UnboundedSender<Inbound>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    pub fn endpoint(&self) -> &ChannelEndpoint {
        &self.endpoint
    }

    /// Next text the session sent; `None` once the session dropped the connection
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Sent text already queued, without waiting
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// True once the session closed or dropped its end
    pub fn is_closed(&self) -> bool {
        self.from_client.is_closed()
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Inbound::Frame(Frame::Text(text.into())));
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) {
        let _ = self
            .to_client
            .send(Inbound::Frame(Frame::Binary(data.into())));
    }

    /// Deliver a transport error without closing
    pub fn error(&self, message: impl Into<String>) {
        let _ = self.to_client.send(Inbound::Error(message.into()));
    }

    pub fn close(&self) {
        let _ = self.to_client.send(Inbound::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(subprotocol: &str) -> ChannelEndpoint {
        ChannelEndpoint {
            url: "ws://memory/".to_string(),
            subprotocol: subprotocol.to_string(),
            origin: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut server) = MemoryConnector::pair();
        let mut conn = connector.connect(&endpoint("cp")).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        conn.send_text("hello".to_string()).await.unwrap();
        assert_eq!(peer.recv_text().await.as_deref(), Some("hello"));

        peer.send_text("world");
        peer.send_binary(vec![1, 2, 3]);
        assert_eq!(conn.recv().await, Some(Ok(Frame::Text("world".to_string()))));
        assert_eq!(conn.recv().await, Some(Ok(Frame::Binary(vec![1, 2, 3]))));

        peer.error("boom");
        assert_eq!(
            conn.recv().await,
            Some(Err(TransportError::Receive("boom".to_string())))
        );

        peer.close();
        assert_eq!(conn.recv().await, None);
        assert_eq!(conn.recv().await, None);
        assert!(conn.send_text("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_failures_by_subprotocol() {
        let (connector, mut server) = MemoryConnector::pair();
        server.fail_next_on("ab", TransportError::Connect("refused".to_string()));

        assert!(connector.connect(&endpoint("cp")).await.is_ok());
        assert!(matches!(
            connector.connect(&endpoint("ab")).await,
            Err(TransportError::Connect(_))
        ));
        assert!(connector.connect(&endpoint("ab")).await.is_ok());

        assert_eq!(server.attempts(), 3);
        assert_eq!(server.attempts_on("ab"), 2);

        let ab = server.accept_on("ab").await.unwrap();
        assert_eq!(ab.endpoint().subprotocol, "ab");
        let cp = server.accept().await.unwrap();
        assert_eq!(cp.endpoint().subprotocol, "cp");
    }

    #[tokio::test]
    async fn test_peer_sees_client_close() {
        let (connector, mut server) = MemoryConnector::pair();
        let mut conn = connector.connect(&endpoint("cp")).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        conn.close().await.unwrap();
        assert_eq!(peer.recv_text().await, None);
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_connect_fails_once_server_dropped() {
        let (connector, server) = MemoryConnector::pair();
        drop(server);
        assert!(matches!(
            connector.connect(&endpoint("cp")).await,
            Err(TransportError::Connect(_))
        ));
    }
}
