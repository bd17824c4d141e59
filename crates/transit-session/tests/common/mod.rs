#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use transit_config::SessionOptions;
use transit_session::{MemoryConnector, MemoryPeer, MemoryServer, Session, SessionEvent};

pub const CP: &str = "cp.iotransit.net";
pub const AB: &str = "ab.iotransit.net";

/// Sent by tests after the frames under test; its event marks the end of them
pub const SENTINEL_CP: &str = r#"{"t":"ext","p":{"cmd":"loglevels","sentinel":true}}"#;
pub const SENTINEL_AB: &str = r#"{"t":"sentinel","p":{}}"#;

pub fn session(options: SessionOptions) -> (Session, MemoryServer) {
    let (connector, server) = MemoryConnector::pair();
    let session = Session::with_connector(options, Arc::new(connector)).unwrap();
    (session, server)
}

pub async fn recv(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(600), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed")
}

/// Collect events up to and including the first one matching `until`
pub async fn recv_until(
    events: &mut broadcast::Receiver<SessionEvent>,
    until: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = recv(events).await;
        let done = until(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub fn is_sentinel(event: &SessionEvent) -> bool {
    match event {
        SessionEvent::ControlPlaneMessage(envelope) => envelope.p.get("sentinel").is_some(),
        SessionEvent::AppBridgeMessage(envelope) => envelope.t == "sentinel",
        _ => false,
    }
}

/// Accept the next connection on `subprotocol` and consume its `authapp`
pub async fn accept_authenticated(server: &mut MemoryServer, subprotocol: &str) -> MemoryPeer {
    let mut peer = server.accept_on(subprotocol).await.expect("server closed");
    let auth = recv_json(&mut peer).await;
    assert_eq!(auth["t"], "authapp");
    peer
}

pub async fn recv_json(peer: &mut MemoryPeer) -> Value {
    let text = peer.recv_text().await.expect("peer closed");
    serde_json::from_str(&text).unwrap()
}
