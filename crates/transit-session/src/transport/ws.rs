//! WebSocket transport
//!
//! tokio-tungstenite client that negotiates the channel subprotocol and sends
//! the channel origin. Ping/pong is answered by tungstenite itself.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest, http::HeaderValue, protocol::Message, Error as WsError,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use super::{ChannelEndpoint, Connection, Connector, Frame, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for `ws://` and `wss://` endpoints
#[derive(Debug, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        #[cfg(feature = "tls")]
        {
            // Err only means a process-wide provider is already installed
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        Self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        endpoint: &ChannelEndpoint,
    ) -> Result<Box<dyn Connection>, TransportError> {
        debug!(url = %endpoint.url, subprotocol = %endpoint.subprotocol, "Connecting to WebSocket");

        let mut request = endpoint
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&endpoint.subprotocol)
                .map_err(|e| TransportError::Request(format!("subprotocol: {}", e)))?,
        );
        headers.insert(
            "Origin",
            HeaderValue::from_str(&endpoint.origin)
                .map_err(|e| TransportError::Request(format!("origin: {}", e)))?,
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(url = %endpoint.url, "WebSocket connected");
        Ok(Box::new(WsConnection { ws, errored: false }))
    }
}

/// A connected WebSocket
pub struct WsConnection {
    ws: WsStream,
    /// Set after a transport error; the next read reports the close
    errored: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        if self.errored {
            return None;
        }
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(Frame::Text(text))),
                Some(Ok(Message::Binary(data))) => return Some(Ok(Frame::Binary(data))),
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Peer closed WebSocket");
                    return None;
                }
                // ping, pong, raw frames
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return None
                }
                Some(Err(e)) => {
                    self.errored = true;
                    return Some(Err(TransportError::Receive(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let endpoint = ChannelEndpoint {
            // port 1 on loopback is not listening
            url: "ws://127.0.0.1:1/".to_string(),
            subprotocol: "cp.iotransit.net".to_string(),
            origin: "control".to_string(),
        };

        let result = WsConnector::new().connect(&endpoint).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_request_error() {
        let endpoint = ChannelEndpoint {
            url: "not a url".to_string(),
            subprotocol: "cp.iotransit.net".to_string(),
            origin: "control".to_string(),
        };

        let result = WsConnector::new().connect(&endpoint).await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[cfg(feature = "tls")]
    #[tokio::test]
    async fn test_wss_starts_a_tls_handshake() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            socket.read_exact(&mut first).await.unwrap();
            first[0]
        });

        let endpoint = ChannelEndpoint {
            url: format!("wss://127.0.0.1:{}/", port),
            subprotocol: "ab.iotransit.net".to_string(),
            origin: "appBridge".to_string(),
        };

        // the listener hangs up after the first byte, so the handshake fails
        match WsConnector::new().connect(&endpoint).await {
            Err(TransportError::Connect(error)) => {
                assert!(!error.contains("TLS support not compiled in"), "{}", error);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("handshake completed against a plain TCP listener"),
        }

        // 0x16 opens a TLS handshake record (ClientHello)
        assert_eq!(server.await.unwrap(), 0x16);
    }
}
