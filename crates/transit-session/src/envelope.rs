//! Wire envelope
//!
//! Both channels exchange `{"t": <type>, "p": <payload>}` JSON objects.
//! A few messages (the app bridge `authaccept`) carry extra top-level
//! fields, which are kept in [`Envelope::extra`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use transit_config::{AcceptTags, Credentials};

pub const TYPE_AUTH_REQUEST: &str = "authapp";
pub const TYPE_AUTH_ACCEPT: &str = "authaccept";
pub const TYPE_EVENT: &str = "evt";

pub const CMD_SET_CONFIG: &str = "setconfig";
pub const CMD_LOG_LEVELS: &str = "loglevels";

/// One framed message on either channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Type discriminator
    pub t: String,
    /// Payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub p: Value,
    /// Top-level fields outside `p`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn new(t: impl Into<String>, p: Value) -> Self {
        Self {
            t: t.into(),
            p,
            extra: Map::new(),
        }
    }

    /// The `authapp` request sent first on every fresh connection
    pub fn auth_request(credentials: &Credentials, accepts: &AcceptTags) -> Self {
        Self::new(
            TYPE_AUTH_REQUEST,
            serde_json::json!({
                "user": credentials.user,
                "pass": credentials.pass,
                "accept": accepts.to_vec(),
            }),
        )
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// `p.cmd`, when the payload carries a string command
    pub fn command(&self) -> Option<&str> {
        self.p.get("cmd").and_then(Value::as_str)
    }

    /// Field from the payload, `Null` when absent
    pub fn payload_field(&self, key: &str) -> Value {
        self.p.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn top_level(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
