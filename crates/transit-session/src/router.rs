//! Message routing
//!
//! Classifies inbound text frames. Routing is pure: the channel task applies
//! whatever the [`RouteResult`] asks for.

use transit_config::AcceptTags;

use crate::envelope::{Envelope, CMD_SET_CONFIG, TYPE_AUTH_ACCEPT, TYPE_EVENT};
use crate::event::CommandEvent;
use crate::settings::{RemoteConfigError, SettingsUpdate};

/// Result of routing a message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteResult {
    /// Decoded `evt` command
    Command(CommandEvent),
    /// Raw control plane message, after the settings update it carried, if any
    ControlPlane {
        envelope: Envelope,
        update: Option<Result<SettingsUpdate, RemoteConfigError>>,
    },
    /// Raw app bridge message
    AppBridge(Envelope),
    /// App bridge `authaccept`, for the handshake
    AuthAccept(Envelope),
    /// Type not accepted by this session
    Dropped(String),
    /// Not a usable envelope
    Malformed(String),
}

#[derive(Debug, Clone)]
enum Rules {
    ControlPlane {
        accepts: AcceptTags,
        emit_events_as_cp: bool,
    },
    AppBridge,
}

/// Routes messages for one channel
#[derive(Debug, Clone)]
pub struct MessageRouter {
    rules: Rules,
}

impl MessageRouter {
    pub fn control_plane(accepts: AcceptTags, emit_events_as_cp: bool) -> Self {
        Self {
            rules: Rules::ControlPlane {
                accepts,
                emit_events_as_cp,
            },
        }
    }

    pub fn app_bridge() -> Self {
        Self {
            rules: Rules::AppBridge,
        }
    }

    /// Route an incoming text frame
    pub fn route(&self, text: &str) -> RouteResult {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => return RouteResult::Malformed(e.to_string()),
        };

        match &self.rules {
            Rules::ControlPlane {
                accepts,
                emit_events_as_cp,
            } => Self::route_control_plane(envelope, accepts, *emit_events_as_cp),
            Rules::AppBridge => Self::route_app_bridge(envelope),
        }
    }

    fn route_control_plane(
        envelope: Envelope,
        accepts: &AcceptTags,
        emit_events_as_cp: bool,
    ) -> RouteResult {
        if envelope.t == TYPE_EVENT {
            if emit_events_as_cp {
                return RouteResult::ControlPlane {
                    envelope,
                    update: None,
                };
            }
            return match CommandEvent::from_envelope(&envelope) {
                Some(command) => RouteResult::Command(command),
                None => RouteResult::Malformed("evt without a string p.cmd".to_string()),
            };
        }

        if !accepts.matches(&envelope.t) {
            return RouteResult::Dropped(envelope.t);
        }

        // loglevels and unknown commands have no built-in effect
        let update = match envelope.command() {
            Some(CMD_SET_CONFIG) => Some(SettingsUpdate::from_envelope(&envelope)),
            _ => None,
        };

        RouteResult::ControlPlane { envelope, update }
    }

    fn route_app_bridge(envelope: Envelope) -> RouteResult {
        if envelope.t == TYPE_AUTH_ACCEPT {
            RouteResult::AuthAccept(envelope)
        } else {
            RouteResult::AppBridge(envelope)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn control_plane(emit_events_as_cp: bool) -> MessageRouter {
        MessageRouter::control_plane(AcceptTags::single("ext"), emit_events_as_cp)
    }

    #[test]
    fn test_evt_decoded_as_command() {
        let result = control_plane(false).route(r#"{"t":"evt","p":{"cmd":"foo","args":1,"dto":2}}"#);
        assert_eq!(
            result,
            RouteResult::Command(CommandEvent {
                name: "foo".to_string(),
                args: json!(1),
                dto: json!(2),
            })
        );
    }

    #[test]
    fn test_evt_passed_through_when_raw() {
        let text = r#"{"t":"evt","p":{"cmd":"foo","args":1,"dto":2}}"#;
        match control_plane(true).route(text) {
            RouteResult::ControlPlane { envelope, update } => {
                assert_eq!(envelope, Envelope::from_json(text).unwrap());
                assert!(update.is_none());
            }
            other => panic!("unexpected route: {:?}", other),
        }
    }

    #[test]
    fn test_evt_is_not_filtered_by_accepts() {
        let router = MessageRouter::control_plane(AcceptTags::single("other"), false);
        assert!(matches!(
            router.route(r#"{"t":"evt","p":{"cmd":"foo"}}"#),
            RouteResult::Command(_)
        ));
    }

    #[test]
    fn test_evt_without_cmd_is_malformed() {
        assert!(matches!(
            control_plane(false).route(r#"{"t":"evt","p":{"args":1}}"#),
            RouteResult::Malformed(_)
        ));
    }

    #[test]
    fn test_unaccepted_type_dropped() {
        assert_eq!(
            control_plane(false).route(r#"{"t":"other","p":{"cmd":"setconfig","region":"au"}}"#),
            RouteResult::Dropped("other".to_string())
        );
    }

    #[test]
    fn test_wildcard_type_accepted() {
        assert!(matches!(
            control_plane(false).route(r#"{"t":"all","p":{"cmd":"loglevels"}}"#),
            RouteResult::ControlPlane { update: None, .. }
        ));
    }

    #[test]
    fn test_setconfig_carries_update() {
        match control_plane(false).route(r#"{"t":"ext","p":{"cmd":"setconfig","region":"au"}}"#) {
            RouteResult::ControlPlane {
                update: Some(Ok(update)),
                ..
            } => assert_eq!(update.region.as_deref(), Some("au")),
            other => panic!("unexpected route: {:?}", other),
        }

        assert!(matches!(
            control_plane(false).route(r#"{"t":"ext","p":{"cmd":"setconfig","secret":1}}"#),
            RouteResult::ControlPlane {
                update: Some(Err(RemoteConfigError::UnknownKey(_))),
                ..
            }
        ));
    }

    #[test]
    fn test_app_bridge_routes() {
        let router = MessageRouter::app_bridge();
        assert!(matches!(
            router.route(r#"{"t":"authaccept","sn":"A","s2":"B"}"#),
            RouteResult::AuthAccept(_)
        ));
        assert!(matches!(
            router.route(r#"{"t":"data","p":{"x":1}}"#),
            RouteResult::AppBridge(_)
        ));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            MessageRouter::app_bridge().route("{not json"),
            RouteResult::Malformed(_)
        ));
        assert!(matches!(
            control_plane(false).route("[1,2]"),
            RouteResult::Malformed(_)
        ));
    }
}
