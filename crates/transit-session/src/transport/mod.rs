//! Transport seam
//!
//! A [`Connector`] opens framed, bidirectional connections; a [`Connection`]
//! sends text and yields inbound [`Frame`]s until the peer goes away. Nothing
//! here knows about envelopes, authentication or reconnection.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use transit_config::Endpoint;

pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use ws::WsConnector;

/// Everything a connector needs to reach one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub url: String,
    pub subprotocol: String,
    pub origin: String,
}

impl ChannelEndpoint {
    pub fn new(endpoint: &Endpoint, secure: bool) -> Self {
        Self {
            url: endpoint.url(secure),
            subprotocol: endpoint.subprotocol.clone(),
            origin: endpoint.origin.clone(),
        }
    }
}

/// One inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Opens connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &ChannelEndpoint)
        -> Result<Box<dyn Connection>, TransportError>;
}

/// A live connection
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame.
    ///
    /// `None` means the connection is closed. An `Err` reports a transport
    /// error; the connection may still deliver frames or close afterwards.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Transport-related errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("invalid request: {0}")]
    Request(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_endpoint_from_config() {
        let endpoint = Endpoint {
            host: "10.0.0.1".to_string(),
            port: 10022,
            subprotocol: "cp.iotransit.net".to_string(),
            origin: "control".to_string(),
        };

        let plain = ChannelEndpoint::new(&endpoint, false);
        assert_eq!(plain.url, "ws://10.0.0.1:10022/");
        assert_eq!(plain.subprotocol, "cp.iotransit.net");

        let secure = ChannelEndpoint::new(&endpoint, true);
        assert_eq!(secure.url, "wss://10.0.0.1:10022/");
    }
}
