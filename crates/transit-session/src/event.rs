//! Session events
//!
//! Both channels publish into one broadcast [`EventBus`]; callers get a
//! receiver from `Session::subscribe` and match on [`SessionEvent`].

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::auth::SessionTokens;
use crate::envelope::Envelope;

/// Which of the two channels something happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    ControlPlane,
    AppBridge,
}

impl ChannelKind {
    /// Short label used in metrics and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::ControlPlane => "cp",
            ChannelKind::AppBridge => "ab",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::ControlPlane => f.write_str("control plane"),
            ChannelKind::AppBridge => f.write_str("app bridge"),
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cp" | "control" | "control-plane" | "controlplane" => Ok(ChannelKind::ControlPlane),
            "ab" | "bridge" | "app-bridge" | "appbridge" => Ok(ChannelKind::AppBridge),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// A decoded control plane `evt` command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandEvent {
    pub name: String,
    pub args: Value,
    pub dto: Value,
}

impl CommandEvent {
    /// Decode `{"t":"evt","p":{"cmd":..,"args":..,"dto":..}}`; `None` without a string `cmd`
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        Some(Self {
            name: envelope.command()?.to_string(),
            args: envelope.payload_field("args"),
            dto: envelope.payload_field("dto"),
        })
    }
}

/// Everything a session reports
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    Connected {
        channel: ChannelKind,
    },
    ConnectionFailed {
        channel: ChannelKind,
        error: String,
    },
    ConnectionClosed {
        channel: ChannelKind,
    },
    ConnectionError {
        channel: ChannelKind,
        error: String,
    },
    /// App bridge `authaccept` received
    Authenticated {
        channel: ChannelKind,
        tokens: SessionTokens,
    },
    /// No `authaccept` within the auth timeout
    AuthFailed {
        channel: ChannelKind,
    },
    ControlPlaneMessage(Envelope),
    AppBridgeMessage(Envelope),
    SendError {
        channel: ChannelKind,
        reason: String,
    },
    Command(CommandEvent),
    /// A remote `setconfig` was applied
    ConfigUpdated {
        fields: Vec<String>,
    },
    ConfigRejected {
        reason: String,
    },
    /// A text frame that is not a usable envelope
    MalformedMessage {
        channel: ChannelKind,
        error: String,
    },
}

impl SessionEvent {
    /// Notification name; decoded commands are named by their command
    pub fn name(&self) -> &str {
        match self {
            SessionEvent::Connected { .. } => "connection",
            SessionEvent::ConnectionFailed { .. } => "connectionFailed",
            SessionEvent::ConnectionClosed { .. } => "connectionClose",
            SessionEvent::ConnectionError { .. } => "connectionError",
            SessionEvent::Authenticated { .. } => "authenticated",
            SessionEvent::AuthFailed { .. } => "authFailed",
            SessionEvent::ControlPlaneMessage(_) => "cpMessage",
            SessionEvent::AppBridgeMessage(_) => "abMessage",
            SessionEvent::SendError { .. } => "sendError",
            SessionEvent::Command(command) => &command.name,
            SessionEvent::ConfigUpdated { .. } => "configUpdated",
            SessionEvent::ConfigRejected { .. } => "configRejected",
            SessionEvent::MalformedMessage { .. } => "malformedMessage",
        }
    }

    /// Channel the event happened on
    pub fn channel(&self) -> ChannelKind {
        match self {
            SessionEvent::Connected { channel }
            | SessionEvent::ConnectionFailed { channel, .. }
            | SessionEvent::ConnectionClosed { channel }
            | SessionEvent::ConnectionError { channel, .. }
            | SessionEvent::Authenticated { channel, .. }
            | SessionEvent::AuthFailed { channel }
            | SessionEvent::SendError { channel, .. }
            | SessionEvent::MalformedMessage { channel, .. } => *channel,
            SessionEvent::AppBridgeMessage(_) => ChannelKind::AppBridge,
            SessionEvent::ControlPlaneMessage(_)
            | SessionEvent::Command(_)
            | SessionEvent::ConfigUpdated { .. }
            | SessionEvent::ConfigRejected { .. } => ChannelKind::ControlPlane,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Connected { channel } => write!(f, "{} connected", channel),
            SessionEvent::ConnectionFailed { channel, error } => {
                write!(f, "{} connection failed: {}", channel, error)
            }
            SessionEvent::ConnectionClosed { channel } => {
                write!(f, "{} connection closed", channel)
            }
            SessionEvent::ConnectionError { channel, error } => {
                write!(f, "{} connection error: {}", channel, error)
            }
            SessionEvent::Authenticated { channel, tokens } => {
                write!(f, "{} authenticated (sn={})", channel, tokens.sn)
            }
            SessionEvent::AuthFailed { channel } => {
                write!(f, "{} authentication timed out", channel)
            }
            SessionEvent::ControlPlaneMessage(envelope) => {
                write!(f, "control plane message: {}", envelope.t)
            }
            SessionEvent::AppBridgeMessage(envelope) => {
                write!(f, "app bridge message: {}", envelope.t)
            }
            SessionEvent::SendError { channel, reason } => write!(f, "{} {}", channel, reason),
            SessionEvent::Command(command) => write!(f, "command {}", command.name),
            SessionEvent::ConfigUpdated { fields } => {
                write!(f, "config updated: {}", fields.join(", "))
            }
            SessionEvent::ConfigRejected { reason } => write!(f, "config rejected: {}", reason),
            SessionEvent::MalformedMessage { channel, error } => {
                write!(f, "{} malformed message: {}", channel, error)
            }
        }
    }
}

/// Broadcast fan-in for both channels
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; returns how many subscribers saw it
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
