use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::options::{AcceptsOption, SessionOptions};

pub const DEFAULT_AUTH_USER: &str = "ext";
pub const DEFAULT_AUTH_PASS: &str = "external";
pub const DEFAULT_APP_BRIDGE_URI: &str = "127.0.0.1";
pub const DEFAULT_APP_BRIDGE_PORT: u16 = 10032;
pub const DEFAULT_APP_BRIDGE_SUBPROTOCOL: &str = "ab.iotransit.net";
pub const DEFAULT_APP_BRIDGE_ORIGIN: &str = "appBridge";
pub const DEFAULT_CONTROL_PLANE_URI: &str = "127.0.0.1";
pub const DEFAULT_CONTROL_PLANE_PORT: u16 = 10022;
pub const DEFAULT_CONTROL_PLANE_SUBPROTOCOL: &str = "cp.iotransit.net";
pub const DEFAULT_CONTROL_PLANE_ORIGIN: &str = "control";
pub const DEFAULT_AUTO_RECONNECT: bool = true;
pub const DEFAULT_RECONNECTION_TIMER_MS: u64 = 5000;
pub const DEFAULT_SECURE_WEBSOCKET: bool = false;
pub const DEFAULT_EMIT_EVENTS_AS_CP: bool = false;

/// Tag that matches every session regardless of its accept set.
pub const WILDCARD_TAG: &str = "all";

/// Validated, immutable session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub applet_id: String,
    pub accepts: AcceptTags,
    pub credentials: Credentials,
    pub control_plane: Endpoint,
    pub app_bridge: Endpoint,
    /// Selects `wss://` over `ws://`
    pub secure: bool,
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
    /// Emit `evt` messages as raw control plane messages instead of decoded commands
    pub emit_events_as_cp: bool,
    /// How long the app bridge waits for `authaccept`; `None` waits forever
    pub auth_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Normalize raw options, applying defaults.
    ///
    /// The applet id is mandatory. Empty strings and zero numbers count as
    /// unset and fall back to their defaults; booleans are taken as given.
    pub fn from_options(options: SessionOptions) -> ConfigResult<Self> {
        let applet_id = match options.applet_id {
            None => return Err(ConfigError::MissingAppletId),
            Some(id) if id.is_empty() => return Err(ConfigError::EmptyAppletId),
            Some(id) => id,
        };

        let accepts = match options.accepts {
            None => AcceptTags::single(&applet_id),
            Some(accepts) => AcceptTags::try_from(accepts)?,
        };

        let credentials = Credentials {
            user: non_empty(options.auth_user).unwrap_or_else(|| DEFAULT_AUTH_USER.to_string()),
            pass: non_empty(options.auth_pass).unwrap_or_else(|| DEFAULT_AUTH_PASS.to_string()),
        };

        let control_plane = Endpoint {
            host: non_empty(options.control_plane_uri)
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_URI.to_string()),
            port: non_zero(options.control_plane_port).unwrap_or(DEFAULT_CONTROL_PLANE_PORT),
            subprotocol: non_empty(options.control_plane_sub_protocol)
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_SUBPROTOCOL.to_string()),
            origin: non_empty(options.control_plane_origin)
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_ORIGIN.to_string()),
        };

        let app_bridge = Endpoint {
            host: non_empty(options.app_bridge_uri)
                .unwrap_or_else(|| DEFAULT_APP_BRIDGE_URI.to_string()),
            port: non_zero(options.app_bridge_port).unwrap_or(DEFAULT_APP_BRIDGE_PORT),
            subprotocol: non_empty(options.app_bridge_sub_protocol)
                .unwrap_or_else(|| DEFAULT_APP_BRIDGE_SUBPROTOCOL.to_string()),
            origin: non_empty(options.app_bridge_origin)
                .unwrap_or_else(|| DEFAULT_APP_BRIDGE_ORIGIN.to_string()),
        };

        let reconnect_ms =
            non_zero(options.reconnection_timer).unwrap_or(DEFAULT_RECONNECTION_TIMER_MS);

        let auth_timeout = non_zero(options.auth_timeout).map(Duration::from_millis);

        Ok(Self {
            applet_id,
            accepts,
            credentials,
            control_plane,
            app_bridge,
            secure: options.secure_web_socket.unwrap_or(DEFAULT_SECURE_WEBSOCKET),
            auto_reconnect: options.auto_reconnect.unwrap_or(DEFAULT_AUTO_RECONNECT),
            reconnect_interval: Duration::from_millis(reconnect_ms),
            emit_events_as_cp: options.emit_events_as_cp.unwrap_or(DEFAULT_EMIT_EVENTS_AS_CP),
            auth_timeout,
        })
    }

    /// Control plane transport URL
    pub fn control_plane_url(&self) -> String {
        self.control_plane.url(self.secure)
    }

    /// App bridge transport URL
    pub fn app_bridge_url(&self) -> String {
        self.app_bridge.url(self.secure)
    }
}

impl TryFrom<SessionOptions> for SessionConfig {
    type Error = ConfigError;

    fn try_from(options: SessionOptions) -> ConfigResult<Self> {
        Self::from_options(options)
    }
}

impl TryFrom<&str> for SessionConfig {
    type Error = ConfigError;

    fn try_from(applet_id: &str) -> ConfigResult<Self> {
        Self::from_options(SessionOptions::from(applet_id))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_zero<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

/// Message type tags a session is willing to have routed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptTags(BTreeSet<String>);

impl AcceptTags {
    pub fn single(tag: impl Into<String>) -> Self {
        let mut tags = BTreeSet::new();
        tags.insert(tag.into());
        Self(tags)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// True when `tag` is in the set or is the wildcard `all`
    pub fn matches(&self, tag: &str) -> bool {
        tag == WILDCARD_TAG || self.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl TryFrom<AcceptsOption> for AcceptTags {
    type Error = ConfigError;

    fn try_from(option: AcceptsOption) -> ConfigResult<Self> {
        match option {
            AcceptsOption::One(tag) => Ok(Self::single(tag)),
            AcceptsOption::Many(tags) => {
                if tags.is_empty() {
                    return Err(ConfigError::Validation(
                        "accepts must contain at least one tag".to_string(),
                    ));
                }
                Ok(Self(tags.into_iter().collect()))
            }
        }
    }
}

/// Credentials sent in the `authapp` handshake
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Where one channel connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub subprotocol: String,
    pub origin: String,
}

impl Endpoint {
    pub fn url(&self, secure: bool) -> String {
        let scheme = if secure { "wss" } else { "ws" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

/// 配置文件结构 (~/.transit/config.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FileConfig {
    /// 按点分键读取配置值 (如: session.appletId, logging.level)
    pub fn get_value(&self, key: &str) -> ConfigResult<Option<String>> {
        match key.split_once('.') {
            Some(("session", name)) => {
                if !SessionOptions::KEYS.contains(&name) {
                    return Err(ConfigError::KeyNotFound(key.to_string()));
                }
                let value = serde_json::to_value(&self.session)?;
                Ok(value.get(name).map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }))
            }
            Some(("logging", "level")) => Ok(Some(self.logging.level.to_string())),
            Some(("logging", "json")) => Ok(Some(self.logging.json.to_string())),
            Some(("logging", "ansi")) => Ok(Some(self.logging.ansi.to_string())),
            _ => Err(ConfigError::KeyNotFound(key.to_string())),
        }
    }

    /// 设置配置值
    ///
    /// Session values are parsed as JSON first (numbers, booleans, lists) and
    /// fall back to a plain string.
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        match key.split_once('.') {
            Some(("session", name)) => {
                if !SessionOptions::KEYS.contains(&name) {
                    return Err(ConfigError::KeyNotFound(key.to_string()));
                }
                let literal = serde_json::Value::String(value.to_string());
                let parsed = serde_json::from_str::<serde_json::Value>(value)
                    .unwrap_or_else(|_| literal.clone());

                // "123" for a string field should stay a string
                self.session = self.with_session_key(name, parsed).or_else(|e| {
                    self.with_session_key(name, literal).map_err(|_| {
                        ConfigError::Validation(format!("Invalid value for {}: {}", key, e))
                    })
                })?;
            }
            Some(("logging", "level")) => {
                self.logging.level = value.parse()?;
            }
            Some(("logging", "json")) => {
                self.logging.json = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid boolean: {}", value))
                })?;
            }
            Some(("logging", "ansi")) => {
                self.logging.ansi = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid boolean: {}", value))
                })?;
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }

    fn with_session_key(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<SessionOptions, serde_json::Error> {
        let mut current = serde_json::to_value(&self.session)?;
        if let Some(object) = current.as_object_mut() {
            object.insert(name.to_string(), value);
        }
        serde_json::from_value(current)
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            ansi: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mandatory appletId not provided in config")]
    MissingAppletId,

    #[error("mandatory appletId is empty")]
    EmptyAppletId,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_applet_id() {
        let config = SessionConfig::try_from("weather").unwrap();

        assert_eq!(config.applet_id, "weather");
        assert_eq!(config.accepts, AcceptTags::single("weather"));
        assert_eq!(config.credentials.user, "ext");
        assert_eq!(config.credentials.pass, "external");
        assert_eq!(config.control_plane_url(), "ws://127.0.0.1:10022/");
        assert_eq!(config.app_bridge_url(), "ws://127.0.0.1:10032/");
        assert_eq!(config.control_plane.subprotocol, "cp.iotransit.net");
        assert_eq!(config.app_bridge.origin, "appBridge");
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(5000));
        assert!(!config.emit_events_as_cp);
        assert_eq!(config.auth_timeout, None);
    }

    #[test]
    fn test_missing_applet_id_is_fatal() {
        let err = SessionConfig::from_options(SessionOptions::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAppletId));

        let err = SessionConfig::from_options(SessionOptions::new("")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAppletId));
        assert_eq!(err.to_string(), "mandatory appletId is empty");
    }

    #[test]
    fn test_string_accepts_becomes_single_tag() {
        let config =
            SessionConfig::from_options(SessionOptions::new("a").with_accepts("ext")).unwrap();
        assert_eq!(config.accepts.to_vec(), vec!["ext".to_string()]);
        assert!(!config.accepts.contains("a"));
    }

    #[test]
    fn test_list_accepts_used_as_is() {
        let config =
            SessionConfig::from_options(SessionOptions::new("a").with_accepts(vec!["y", "x"]))
                .unwrap();
        assert_eq!(config.accepts.len(), 2);
        assert!(config.accepts.contains("x"));
        assert!(config.accepts.contains("y"));
    }

    #[test]
    fn test_empty_accepts_list_rejected() {
        let err = SessionConfig::from_options(
            SessionOptions::new("a").with_accepts(Vec::<String>::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_wildcard_matches() {
        let tags = AcceptTags::single("ext");
        assert!(tags.matches("ext"));
        assert!(tags.matches("all"));
        assert!(!tags.matches("other"));
    }

    #[test]
    fn test_zero_and_empty_fall_back_to_defaults() {
        let options = SessionOptions {
            control_plane_uri: Some(String::new()),
            control_plane_port: Some(0),
            reconnection_timer: Some(0),
            ..SessionOptions::new("a")
        };
        let config = SessionConfig::from_options(options).unwrap();
        assert_eq!(config.control_plane.host, DEFAULT_CONTROL_PLANE_URI);
        assert_eq!(config.control_plane.port, DEFAULT_CONTROL_PLANE_PORT);
        assert_eq!(config.reconnect_interval, Duration::from_millis(5000));
    }

    #[test]
    fn test_booleans_taken_as_given() {
        let options = SessionOptions {
            secure_web_socket: Some(true),
            ..SessionOptions::new("a").with_auto_reconnect(false)
        };
        let config = SessionConfig::from_options(options).unwrap();
        assert!(!config.auto_reconnect);
        assert!(config.secure);
        assert_eq!(config.app_bridge_url(), "wss://127.0.0.1:10032/");
    }

    #[test]
    fn test_auth_timeout_is_opt_in() {
        let config =
            SessionConfig::from_options(SessionOptions::new("a").with_auth_timeout(0)).unwrap();
        assert_eq!(config.auth_timeout, None);

        let config =
            SessionConfig::from_options(SessionOptions::new("a").with_auth_timeout(1500)).unwrap();
        assert_eq!(config.auth_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let config = SessionConfig::try_from("a").unwrap();
        let debug = format!("{:?}", config.credentials);
        assert!(debug.contains("ext"));
        assert!(!debug.contains("external"));
    }

    #[test]
    fn test_file_config_get_set() {
        let mut file = FileConfig::default();
        file.set_value("session.appletId", "weather").unwrap();
        file.set_value("session.controlPlanePort", "9000").unwrap();
        file.set_value("session.autoReconnect", "false").unwrap();
        file.set_value("logging.level", "debug").unwrap();

        assert_eq!(file.get_value("session.appletId").unwrap(), Some("weather".to_string()));
        assert_eq!(file.get_value("session.controlPlanePort").unwrap(), Some("9000".to_string()));
        assert_eq!(file.session.auto_reconnect, Some(false));
        assert_eq!(file.logging.level, LogLevel::Debug);
        assert_eq!(file.get_value("session.authUser").unwrap(), None);
    }

    #[test]
    fn test_file_config_rejects_unknown_and_mistyped_keys() {
        let mut file = FileConfig::default();
        assert!(matches!(
            file.set_value("session.region", "au"),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert!(matches!(
            file.set_value("session.controlPlanePort", "not-a-port"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(file.get_value("server.port"), Err(ConfigError::KeyNotFound(_))));
    }
}
