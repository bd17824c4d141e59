//! Remotely configurable session settings
//!
//! A control plane `setconfig` command may only touch the fields listed in
//! [`SettingsUpdate::KEYS`]. An update with any other key, or a non-string
//! value, is rejected whole.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;

/// Settings the control plane may change at runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    pub region: Option<String>,
    pub auth_device: Option<String>,
    pub auth_domain: Option<String>,
}

impl RemoteSettings {
    /// Apply an accepted update, returning the names of the fields it set
    pub fn apply(&mut self, update: SettingsUpdate) -> Vec<String> {
        let mut fields = Vec::new();
        if let Some(region) = update.region {
            self.region = Some(region);
            fields.push("region".to_string());
        }
        if let Some(device) = update.auth_device {
            self.auth_device = Some(device);
            fields.push("authDevice".to_string());
        }
        if let Some(domain) = update.auth_domain {
            self.auth_domain = Some(domain);
            fields.push("authDomain".to_string());
        }
        fields
    }
}

/// Typed `setconfig` payload. `null` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub auth_device: Option<String>,
    #[serde(default)]
    pub auth_domain: Option<String>,
}

impl SettingsUpdate {
    pub const KEYS: &'static [&'static str] = &["region", "authDevice", "authDomain"];

    /// Parse the payload of a `setconfig` envelope, ignoring `cmd`
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, RemoteConfigError> {
        let Value::Object(payload) = &envelope.p else {
            return Err(RemoteConfigError::NotAnObject);
        };

        let mut fields = payload.clone();
        fields.remove("cmd");

        if let Some(key) = fields.keys().find(|key| !Self::KEYS.contains(&key.as_str())) {
            return Err(RemoteConfigError::UnknownKey(key.clone()));
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|e| RemoteConfigError::InvalidValue(e.to_string()))
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteConfigError {
    #[error("setconfig payload is not an object")]
    NotAnObject,

    #[error("setconfig key not allowed: {0}")]
    UnknownKey(String),

    #[error("invalid setconfig value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setconfig(p: Value) -> Envelope {
        Envelope::new("ext", p)
    }

    #[test]
    fn test_allowed_keys_apply() {
        let update = SettingsUpdate::from_envelope(&setconfig(
            json!({"cmd": "setconfig", "region": "au", "authDomain": "example.org"}),
        ))
        .unwrap();

        let mut settings = RemoteSettings::default();
        let fields = settings.apply(update);

        assert_eq!(fields, vec!["region".to_string(), "authDomain".to_string()]);
        assert_eq!(settings.region.as_deref(), Some("au"));
        assert_eq!(settings.auth_domain.as_deref(), Some("example.org"));
        assert_eq!(settings.auth_device, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SettingsUpdate::from_envelope(&setconfig(
            json!({"cmd": "setconfig", "region": "au", "appletId": "evil"}),
        ))
        .unwrap_err();
        assert_eq!(err, RemoteConfigError::UnknownKey("appletId".to_string()));
    }

    #[test]
    fn test_non_string_value_rejected() {
        let err = SettingsUpdate::from_envelope(&setconfig(
            json!({"cmd": "setconfig", "region": 7}),
        ))
        .unwrap_err();
        assert!(matches!(err, RemoteConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let err = SettingsUpdate::from_envelope(&setconfig(json!("setconfig"))).unwrap_err();
        assert_eq!(err, RemoteConfigError::NotAnObject);
    }

    #[test]
    fn test_null_leaves_field_untouched() {
        let mut settings = RemoteSettings {
            region: Some("eu".to_string()),
            ..Default::default()
        };
        let update = SettingsUpdate::from_envelope(&setconfig(
            json!({"cmd": "setconfig", "region": null}),
        ))
        .unwrap();
        assert!(settings.apply(update).is_empty());
        assert_eq!(settings.region.as_deref(), Some("eu"));
    }
}
