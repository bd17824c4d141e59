//! Channel lifecycle
//!
//! Each channel runs as one spawned task that owns its connection, handshake,
//! router and reconnect timer. [`ChannelManager`] is the handle: it sends
//! commands to the task and reads the snapshot the task publishes.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument};
use transit_config::SessionConfig;

use crate::auth::{AcceptOutcome, AuthHandshake, AuthState};
use crate::envelope::Envelope;
use crate::event::{ChannelKind, EventBus, SessionEvent};
use crate::reconnect::ReconnectScheduler;
use crate::router::{MessageRouter, RouteResult};
use crate::settings::{RemoteConfigError, RemoteSettings, SettingsUpdate};
use crate::transport::{ChannelEndpoint, Connection, Connector, Frame, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Point-in-time view of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub status: LinkStatus,
    pub auth: AuthState,
    pub connected_at: Option<DateTime<Utc>>,
    pub reconnect_pending: bool,
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            status: LinkStatus::Disconnected,
            auth: AuthState::Idle,
            connected_at: None,
            reconnect_pending: false,
        }
    }
}

#[derive(Debug)]
enum ChannelCommand {
    Connect,
    Disconnect,
    Send(Envelope),
    SetAutoReconnect(bool),
    Shutdown,
}

/// Handle to one channel task
#[derive(Debug, Clone)]
pub struct ChannelManager {
    kind: ChannelKind,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    snapshot: watch::Receiver<ChannelSnapshot>,
    events: EventBus,
}

impl ChannelManager {
    /// Spawn the control plane task. Must be called within a tokio runtime.
    pub fn control_plane(
        config: &SessionConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
        settings: watch::Sender<RemoteSettings>,
        session_id: &str,
    ) -> Self {
        let auth = AuthHandshake::implicit(config.credentials.clone(), config.accepts.clone());
        let router = MessageRouter::control_plane(config.accepts.clone(), config.emit_events_as_cp);
        Self::spawn(
            ChannelKind::ControlPlane,
            ChannelEndpoint::new(&config.control_plane, config.secure),
            config,
            connector,
            events,
            auth,
            router,
            Some(settings),
            session_id,
        )
    }

    /// Spawn the app bridge task. Must be called within a tokio runtime.
    pub fn app_bridge(
        config: &SessionConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
        session_id: &str,
    ) -> Self {
        let auth = AuthHandshake::acknowledged(
            config.credentials.clone(),
            config.accepts.clone(),
            config.auth_timeout,
        );
        Self::spawn(
            ChannelKind::AppBridge,
            ChannelEndpoint::new(&config.app_bridge, config.secure),
            config,
            connector,
            events,
            auth,
            MessageRouter::app_bridge(),
            None,
            session_id,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn(
        kind: ChannelKind,
        endpoint: ChannelEndpoint,
        config: &SessionConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
        auth: AuthHandshake,
        router: MessageRouter,
        settings: Option<watch::Sender<RemoteSettings>>,
        session_id: &str,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ChannelSnapshot::default());

        let task = ChannelTask {
            kind,
            endpoint,
            connector,
            auth,
            router,
            reconnect: ReconnectScheduler::new(config.auto_reconnect, config.reconnect_interval),
            events: events.clone(),
            settings,
            snapshot: snapshot_tx,
            status: LinkStatus::Disconnected,
            connection: None,
            pending_connect: None,
            connected_at: None,
        };

        let span = info_span!("channel", session_id = %session_id, channel = kind.as_str());
        tokio::spawn(task.run(commands_rx).instrument(span));

        Self {
            kind,
            commands: commands_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Start connecting unless already connecting or connected
    pub fn connect(&self) {
        self.command(ChannelCommand::Connect);
    }

    /// Drop the live connection, if any. Auto-reconnect still applies.
    pub fn disconnect(&self) {
        self.command(ChannelCommand::Disconnect);
    }

    /// Fire-and-forget send; failures surface as `SendError` events
    pub fn send(&self, envelope: Envelope) {
        if self.commands.send(ChannelCommand::Send(envelope)).is_err() {
            self.events.publish(SessionEvent::SendError {
                channel: self.kind,
                reason: "channel stopped".to_string(),
            });
        }
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.command(ChannelCommand::SetAutoReconnect(enabled));
    }

    /// Disable auto-reconnect, abandon any connect in flight and disconnect
    pub fn shutdown(&self) {
        self.command(ChannelCommand::Shutdown);
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> LinkStatus {
        self.snapshot.borrow().status
    }

    /// Receiver that sees every snapshot change
    pub fn watch(&self) -> watch::Receiver<ChannelSnapshot> {
        self.snapshot.clone()
    }

    fn command(&self, command: ChannelCommand) {
        if self.commands.send(command).is_err() {
            debug!(channel = self.kind.as_str(), "Channel task stopped, command dropped");
        }
    }
}

/// Longest a graceful close may take before the connection is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type PendingConnect = BoxFuture<'static, Result<Box<dyn Connection>, TransportError>>;

struct ChannelTask {
    kind: ChannelKind,
    endpoint: ChannelEndpoint,
    connector: Arc<dyn Connector>,
    auth: AuthHandshake,
    router: MessageRouter,
    reconnect: ReconnectScheduler,
    events: EventBus,
    /// Present on the control plane only
    settings: Option<watch::Sender<RemoteSettings>>,
    snapshot: watch::Sender<ChannelSnapshot>,
    status: LinkStatus,
    connection: Option<Box<dyn Connection>>,
    pending_connect: Option<PendingConnect>,
    connected_at: Option<DateTime<Utc>>,
}

impl ChannelTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChannelCommand>) {
        debug!("Channel task started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = connect_result(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    self.on_connect_result(result).await;
                }
                frame = next_frame(&mut self.connection) => self.on_frame(frame),
                _ = self.reconnect.fired() => {
                    info!("Reconnecting");
                    self.start_connect();
                }
                _ = self.auth.expired() => self.on_auth_timeout(),
            }
            self.publish_snapshot();
        }

        if let Some(connection) = self.connection.take() {
            close_connection(connection).await;
        }
        debug!("Channel task stopped");
    }

    async fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Connect => match self.status {
                LinkStatus::Disconnected => {
                    if self.reconnect.cancel() {
                        debug!("Pending reconnect replaced by explicit connect");
                    }
                    self.start_connect();
                }
                status => debug!(?status, "Connect ignored"),
            },
            ChannelCommand::Disconnect => self.disconnect().await,
            ChannelCommand::Send(envelope) => self.send(envelope).await,
            ChannelCommand::SetAutoReconnect(enabled) => {
                info!(enabled, "Auto-reconnect changed");
                self.reconnect.set_enabled(enabled);
            }
            ChannelCommand::Shutdown => {
                self.reconnect.set_enabled(false);
                if self.pending_connect.take().is_some() {
                    debug!("Connect in flight abandoned");
                    self.status = LinkStatus::Disconnected;
                }
                self.disconnect().await;
            }
        }
    }

    fn start_connect(&mut self) {
        info!(url = %self.endpoint.url, "Connecting");
        metrics::counter!("transit_connect_attempts_total", "channel" => self.kind.as_str())
            .increment(1);

        self.status = LinkStatus::Connecting;
        let connector = self.connector.clone();
        let endpoint = self.endpoint.clone();
        self.pending_connect = Some(Box::pin(async move { connector.connect(&endpoint).await }));
    }

    async fn on_connect_result(&mut self, result: Result<Box<dyn Connection>, TransportError>) {
        let mut connection = match result {
            Ok(connection) => connection,
            Err(e) => return self.on_connect_failed(e.to_string()),
        };

        let request = self.auth.on_connected();
        let sent = match request.to_json() {
            Ok(text) => connection.send_text(text).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            self.auth.reset();
            close_connection(connection).await;
            return self.on_connect_failed(format!("auth request not sent: {}", e));
        }

        self.connection = Some(connection);
        self.status = LinkStatus::Connected;
        self.connected_at = Some(Utc::now());

        info!(url = %self.endpoint.url, "Connected");
        metrics::counter!("transit_connections_total", "channel" => self.kind.as_str())
            .increment(1);
        self.emit(SessionEvent::Connected { channel: self.kind });
    }

    fn on_connect_failed(&mut self, error: String) {
        self.status = LinkStatus::Disconnected;

        warn!(url = %self.endpoint.url, error = %error, "Connection failed");
        metrics::counter!("transit_connect_failures_total", "channel" => self.kind.as_str())
            .increment(1);

        let delay = self.reconnect.on_failure();
        self.log_reconnect(delay);
        self.emit(SessionEvent::ConnectionFailed {
            channel: self.kind,
            error,
        });
    }

    fn on_closed(&mut self) {
        self.connection = None;
        self.status = LinkStatus::Disconnected;
        self.connected_at = None;
        self.auth.reset();

        info!("Connection closed");
        metrics::counter!("transit_disconnects_total", "channel" => self.kind.as_str())
            .increment(1);

        let delay = self.reconnect.on_close();
        self.log_reconnect(delay);
        self.emit(SessionEvent::ConnectionClosed { channel: self.kind });
    }

    fn log_reconnect(&self, delay: Option<Duration>) {
        match delay {
            Some(delay) => {
                info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                metrics::counter!("transit_reconnects_scheduled_total", "channel" => self.kind.as_str())
                    .increment(1);
            }
            None => debug!("Auto-reconnect disabled, staying disconnected"),
        }
    }

    async fn disconnect(&mut self) {
        match self.connection.take() {
            Some(connection) => {
                close_connection(connection).await;
                self.on_closed();
            }
            None => debug!(status = ?self.status, "Disconnect ignored, not connected"),
        }
    }

    async fn send(&mut self, envelope: Envelope) {
        let Some(connection) = self.connection.as_mut() else {
            return self.send_failed("not connected".to_string());
        };

        let result = match envelope.to_json() {
            Ok(text) => connection.send_text(text).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(()) => debug!(t = %envelope.t, "Sent"),
            Err(e) => self.send_failed(format!("send failed: {}", e)),
        }
    }

    fn send_failed(&self, reason: String) {
        warn!(reason = %reason, "Send failed");
        metrics::counter!("transit_send_errors_total", "channel" => self.kind.as_str())
            .increment(1);
        self.emit(SessionEvent::SendError {
            channel: self.kind,
            reason,
        });
    }

    fn on_frame(&mut self, frame: Option<Result<Frame, TransportError>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => {
                metrics::counter!("transit_frames_received_total", "channel" => self.kind.as_str())
                    .increment(1);
                self.on_text(&text);
            }
            Some(Ok(Frame::Binary(data))) => {
                debug!(bytes = data.len(), "Binary frame ignored");
                metrics::counter!("transit_binary_frames_total", "channel" => self.kind.as_str())
                    .increment(1);
            }
            Some(Err(e)) => {
                warn!(error = %e, "Connection error");
                self.emit(SessionEvent::ConnectionError {
                    channel: self.kind,
                    error: e.to_string(),
                });
            }
            None => self.on_closed(),
        }
    }

    fn on_text(&mut self, text: &str) {
        match self.router.route(text) {
            RouteResult::Command(command) => {
                debug!(cmd = %command.name, "Command received");
                self.emit(SessionEvent::Command(command));
            }
            RouteResult::ControlPlane { envelope, update } => {
                debug!(t = %envelope.t, "Control plane message");
                if let Some(update) = update {
                    self.apply_settings(update);
                }
                self.emit(SessionEvent::ControlPlaneMessage(envelope));
            }
            RouteResult::AppBridge(envelope) => {
                debug!(t = %envelope.t, "App bridge message");
                self.emit(SessionEvent::AppBridgeMessage(envelope));
            }
            RouteResult::AuthAccept(envelope) => match self.auth.on_accept(&envelope) {
                AcceptOutcome::Authenticated(tokens) => {
                    info!("Authenticated");
                    self.emit(SessionEvent::Authenticated {
                        channel: self.kind,
                        tokens,
                    });
                }
                AcceptOutcome::Ignored(state) => {
                    warn!(state = ?state, "Ignoring authaccept");
                }
            },
            RouteResult::Dropped(t) => debug!(t = %t, "Message type not accepted, dropped"),
            RouteResult::Malformed(error) => {
                warn!(error = %error, "Malformed message");
                metrics::counter!("transit_malformed_frames_total", "channel" => self.kind.as_str())
                    .increment(1);
                self.emit(SessionEvent::MalformedMessage {
                    channel: self.kind,
                    error,
                });
            }
        }
    }

    fn apply_settings(
        &mut self,
        update: Result<SettingsUpdate, RemoteConfigError>,
    ) {
        let Some(settings) = self.settings.as_ref() else {
            return;
        };

        match update {
            Ok(update) => {
                let mut fields = Vec::new();
                settings.send_modify(|current| fields = current.apply(update));
                info!(fields = ?fields, "Remote config applied");
                self.emit(SessionEvent::ConfigUpdated { fields });
            }
            Err(e) => {
                warn!(error = %e, "Remote config rejected");
                metrics::counter!("transit_remote_config_rejected_total").increment(1);
                self.emit(SessionEvent::ConfigRejected {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_auth_timeout(&mut self) {
        if self.auth.on_timeout() {
            warn!("No authaccept before the auth timeout");
            self.emit(SessionEvent::AuthFailed { channel: self.kind });
        }
    }

    /// Publish an event, with the snapshot brought up to date first
    fn emit(&self, event: SessionEvent) {
        self.publish_snapshot();
        self.events.publish(event);
    }

    fn publish_snapshot(&self) {
        let next = ChannelSnapshot {
            status: self.status,
            auth: self.auth.state().clone(),
            connected_at: self.connected_at,
            reconnect_pending: self.reconnect.is_pending(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn close_connection(mut connection: Box<dyn Connection>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, connection.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Close failed"),
        Err(_) => debug!("Close timed out, connection dropped"),
    }
}

async fn connect_result(
    pending_connect: &mut Option<PendingConnect>,
) -> Result<Box<dyn Connection>, TransportError> {
    match pending_connect.as_mut() {
        Some(connect) => connect.await,
        None => pending().await,
    }
}

async fn next_frame(
    connection: &mut Option<Box<dyn Connection>>,
) -> Option<Result<Frame, TransportError>> {
    match connection.as_mut() {
        Some(connection) => connection.recv().await,
        None => pending().await,
    }
}
