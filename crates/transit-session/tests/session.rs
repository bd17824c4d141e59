mod common;

use common::*;
use serde_json::json;
use std::time::Duration;
use tokio::time;
use transit_config::{ConfigError, SessionOptions};
use transit_session::{
    ChannelKind, Envelope, LinkStatus, MemoryConnector, Session, SessionError, SessionEvent,
    TransportError,
};

const T: Duration = Duration::from_millis(1000);

fn options() -> SessionOptions {
    SessionOptions::new("weather")
        .with_reconnection_timer(T.as_millis() as u64)
        .with_auth_timeout(0)
}

#[tokio::test]
async fn construction_without_applet_id_fails() {
    let (connector, server) = MemoryConnector::pair();
    let result = Session::with_connector(
        SessionOptions {
            accepts: Some("ext".into()),
            ..Default::default()
        },
        std::sync::Arc::new(connector),
    );
    assert!(matches!(
        result,
        Err(SessionError::Config(ConfigError::MissingAppletId))
    ));
    assert_eq!(server.attempts(), 0);
}

#[tokio::test]
async fn channels_come_up_independently() {
    let (session, mut server) = session(options().with_auto_reconnect(false));
    let mut events = session.subscribe();
    server.fail_next_on(CP, TransportError::Connect("refused".to_string()));

    session.connect();
    let _ab = accept_authenticated(&mut server, AB).await;

    let mut seen = vec![recv(&mut events).await, recv(&mut events).await];
    seen.sort_by_key(|event| event.name().to_string());
    assert_eq!(
        seen,
        vec![
            SessionEvent::Connected {
                channel: ChannelKind::AppBridge
            },
            SessionEvent::ConnectionFailed {
                channel: ChannelKind::ControlPlane,
                error: "connect failed: refused".to_string(),
            },
        ]
    );
    assert_eq!(session.status(ChannelKind::AppBridge).status, LinkStatus::Connected);
    assert_eq!(
        session.status(ChannelKind::ControlPlane).status,
        LinkStatus::Disconnected
    );
}

#[tokio::test]
async fn connect_is_idempotent() {
    let (session, mut server) = session(options());
    let mut events = session.subscribe();

    session.connect();
    session.connect();
    let mut cp = accept_authenticated(&mut server, CP).await;
    let mut ab = accept_authenticated(&mut server, AB).await;
    recv(&mut events).await;
    recv(&mut events).await;

    session.connect();
    session.send_to_control_plane(Envelope::new("ext", json!({})));
    session.send_to_app_bridge(Envelope::new("data", json!({})));

    // the sends were handled after the repeated connect
    assert_eq!(recv_json(&mut cp).await["t"], "ext");
    assert_eq!(recv_json(&mut ab).await["t"], "data");
    assert_eq!(server.attempts_on(CP), 1);
    assert_eq!(server.attempts_on(AB), 1);
}

#[tokio::test]
async fn disconnect_leaves_unconnected_channels_alone() {
    let (session, mut server) = session(options().with_auto_reconnect(false));
    let mut events = session.subscribe();

    session.channel(ChannelKind::AppBridge).connect();
    let mut ab = accept_authenticated(&mut server, AB).await;
    assert!(matches!(recv(&mut events).await, SessionEvent::Connected { .. }));

    session.disconnect();
    assert_eq!(
        recv(&mut events).await,
        SessionEvent::ConnectionClosed {
            channel: ChannelKind::AppBridge
        }
    );
    assert_eq!(ab.recv_text().await, None);

    // nothing for the control plane, which was never connected
    session.send_to_app_bridge(Envelope::new("data", json!({})));
    assert!(matches!(
        recv(&mut events).await,
        SessionEvent::SendError {
            channel: ChannelKind::AppBridge,
            ..
        }
    ));
    assert_eq!(server.attempts_on(CP), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stays_down() {
    let (session, mut server) = session(options());
    let mut events = session.subscribe();

    session.connect();
    let _cp = accept_authenticated(&mut server, CP).await;
    let _ab = accept_authenticated(&mut server, AB).await;
    recv(&mut events).await;
    recv(&mut events).await;

    session.shutdown();
    let mut closed = vec![recv(&mut events).await, recv(&mut events).await];
    closed.sort_by_key(|event| event.channel().as_str());
    assert_eq!(
        closed,
        vec![
            SessionEvent::ConnectionClosed {
                channel: ChannelKind::AppBridge
            },
            SessionEvent::ConnectionClosed {
                channel: ChannelKind::ControlPlane
            },
        ]
    );

    time::sleep(T * 30).await;
    assert_eq!(server.attempts(), 2);
    assert!(!session.status(ChannelKind::ControlPlane).reconnect_pending);
    assert!(!session.status(ChannelKind::AppBridge).reconnect_pending);
}

#[tokio::test]
async fn send_to_app_bridge_while_disconnected() {
    let (session, _server) = session(options());
    let mut events = session.subscribe();

    session.send_to_app_bridge(Envelope::new("data", json!({})));
    let event = recv(&mut events).await;
    assert_eq!(event.name(), "sendError");
    assert_eq!(event.to_string(), "app bridge not connected");
}

#[tokio::test]
async fn every_subscriber_sees_both_channels() {
    let (session, mut server) = session(options());
    let mut first = session.subscribe();
    let mut second = session.subscribe();

    session.connect();
    let _cp = accept_authenticated(&mut server, CP).await;
    let _ab = accept_authenticated(&mut server, AB).await;

    for events in [&mut first, &mut second] {
        let mut channels = vec![recv(events).await.channel(), recv(events).await.channel()];
        channels.sort_by_key(|channel| channel.as_str());
        assert_eq!(channels, vec![ChannelKind::AppBridge, ChannelKind::ControlPlane]);
    }
}
