//! Session
//!
//! Owns the control plane and app bridge channels and merges their events
//! into one [`EventBus`].

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;
use transit_config::{SessionConfig, SessionOptions};
use uuid::Uuid;

use crate::channel::{ChannelManager, ChannelSnapshot};
use crate::envelope::Envelope;
use crate::error::{SessionError, SessionResult};
use crate::event::{ChannelKind, EventBus, SessionEvent};
use crate::settings::RemoteSettings;
use crate::transport::{Connector, WsConnector};

pub struct Session {
    id: String,
    config: Arc<SessionConfig>,
    events: EventBus,
    settings: watch::Receiver<RemoteSettings>,
    control_plane: ChannelManager,
    app_bridge: ChannelManager,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("applet_id", &self.config.applet_id)
            .field("control_plane", &self.control_plane.status())
            .field("app_bridge", &self.app_bridge.status())
            .finish()
    }
}

impl Session {
    /// Create a session over WebSockets from an applet id or full options.
    ///
    /// Nothing connects until [`Session::connect`].
    pub fn new(options: impl Into<SessionOptions>) -> SessionResult<Self> {
        Self::with_connector(options, Arc::new(WsConnector::new()))
    }

    pub fn with_connector(
        options: impl Into<SessionOptions>,
        connector: Arc<dyn Connector>,
    ) -> SessionResult<Self> {
        let config = SessionConfig::from_options(options.into())?;
        Self::from_config(config, connector)
    }

    pub fn from_config(config: SessionConfig, connector: Arc<dyn Connector>) -> SessionResult<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SessionError::NoRuntime);
        }

        let id = Uuid::new_v4().to_string();
        let events = EventBus::default();
        let (settings_tx, settings_rx) = watch::channel(RemoteSettings::default());

        let control_plane = ChannelManager::control_plane(
            &config,
            connector.clone(),
            events.clone(),
            settings_tx,
            &id,
        );
        let app_bridge = ChannelManager::app_bridge(&config, connector, events.clone(), &id);

        info!(session_id = %id, applet_id = %config.applet_id, "Session created");

        Ok(Self {
            id,
            config: Arc::new(config),
            events,
            settings: settings_rx,
            control_plane,
            app_bridge,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start both channels; they come up independently
    pub fn connect(&self) {
        info!(session_id = %self.id, "Connecting session");
        self.control_plane.connect();
        self.app_bridge.connect();
    }

    /// Drop whichever channels are connected. Auto-reconnect still applies.
    pub fn disconnect(&self) {
        info!(session_id = %self.id, "Disconnecting session");
        self.control_plane.disconnect();
        self.app_bridge.disconnect();
    }

    /// Disable auto-reconnect on both channels, then disconnect them
    pub fn shutdown(&self) {
        info!(session_id = %self.id, "Shutting down session");
        self.control_plane.shutdown();
        self.app_bridge.shutdown();
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.control_plane.set_auto_reconnect(enabled);
        self.app_bridge.set_auto_reconnect(enabled);
    }

    pub fn send_to_control_plane(&self, envelope: Envelope) {
        self.control_plane.send(envelope);
    }

    pub fn send_to_app_bridge(&self, envelope: Envelope) {
        self.app_bridge.send(envelope);
    }

    pub fn send(&self, channel: ChannelKind, envelope: Envelope) {
        self.channel(channel).send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current remotely configured settings
    pub fn settings(&self) -> RemoteSettings {
        self.settings.borrow().clone()
    }

    pub fn watch_settings(&self) -> watch::Receiver<RemoteSettings> {
        self.settings.clone()
    }

    pub fn status(&self, channel: ChannelKind) -> ChannelSnapshot {
        self.channel(channel).snapshot()
    }

    pub fn channel(&self, channel: ChannelKind) -> &ChannelManager {
        match channel {
            ChannelKind::ControlPlane => &self.control_plane,
            ChannelKind::AppBridge => &self.app_bridge,
        }
    }
}
