use serde::{Deserialize, Serialize};

/// Raw session options, as a caller or a config file provides them.
///
/// Every field is optional here; [`crate::SessionConfig::from_options`] fills
/// in defaults and rejects a missing `appletId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepts: Option<AcceptsOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_pass: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_sub_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_bridge_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_bridge_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_bridge_sub_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_bridge_origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_reconnect: Option<bool>,
    /// Retry interval in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnection_timer: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_web_socket: Option<bool>,
    #[serde(rename = "emitEventsAsCP", skip_serializing_if = "Option::is_none")]
    pub emit_events_as_cp: Option<bool>,
    /// App bridge handshake timeout in milliseconds; unset or 0 waits forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_timeout: Option<u64>,
}

impl SessionOptions {
    /// Every key accepted under `session.` in the config file
    pub const KEYS: &'static [&'static str] = &[
        "appletId",
        "accepts",
        "authUser",
        "authPass",
        "controlPlaneUri",
        "controlPlanePort",
        "controlPlaneSubProtocol",
        "controlPlaneOrigin",
        "appBridgeUri",
        "appBridgePort",
        "appBridgeSubProtocol",
        "appBridgeOrigin",
        "autoReconnect",
        "reconnectionTimer",
        "secureWebSocket",
        "emitEventsAsCP",
        "authTimeout",
    ];

    pub fn new(applet_id: impl Into<String>) -> Self {
        Self {
            applet_id: Some(applet_id.into()),
            ..Self::default()
        }
    }

    pub fn with_accepts(mut self, accepts: impl Into<AcceptsOption>) -> Self {
        self.accepts = Some(accepts.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.auth_user = Some(user.into());
        self.auth_pass = Some(pass.into());
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    pub fn with_reconnection_timer(mut self, millis: u64) -> Self {
        self.reconnection_timer = Some(millis);
        self
    }

    pub fn with_emit_events_as_cp(mut self, enabled: bool) -> Self {
        self.emit_events_as_cp = Some(enabled);
        self
    }

    pub fn with_auth_timeout(mut self, millis: u64) -> Self {
        self.auth_timeout = Some(millis);
        self
    }
}

impl From<&str> for SessionOptions {
    fn from(applet_id: &str) -> Self {
        Self::new(applet_id)
    }
}

impl From<String> for SessionOptions {
    fn from(applet_id: String) -> Self {
        Self::new(applet_id)
    }
}

/// `accepts` may be given as a single tag or as a list of tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AcceptsOption {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for AcceptsOption {
    fn from(tag: &str) -> Self {
        Self::One(tag.to_string())
    }
}

impl From<String> for AcceptsOption {
    fn from(tag: String) -> Self {
        Self::One(tag)
    }
}

impl From<Vec<String>> for AcceptsOption {
    fn from(tags: Vec<String>) -> Self {
        Self::Many(tags)
    }
}

impl From<Vec<&str>> for AcceptsOption {
    fn from(tags: Vec<&str>) -> Self {
        Self::Many(tags.into_iter().map(str::to_string).collect())
    }
}
