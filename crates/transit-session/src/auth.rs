//! Authentication handshake
//!
//! Every fresh connection starts with an `authapp` request. The control plane
//! never acknowledges it; the app bridge answers with `authaccept` carrying
//! the `sn`/`s2` session tokens, or the handshake fails when the auth timeout
//! elapses first.

use serde::Serialize;
use serde_json::Value;
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};
use transit_config::{AcceptTags, Credentials};

use crate::envelope::Envelope;

/// Opaque tokens handed out by the app bridge on `authaccept`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTokens {
    pub sn: String,
    pub s2: String,
}

impl SessionTokens {
    fn from_accept(envelope: &Envelope) -> Self {
        Self {
            sn: token(envelope.top_level("sn")),
            s2: token(envelope.top_level("s2")),
        }
    }
}

fn token(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AuthState {
    /// No connection
    Idle,
    /// Request sent on a channel without an acknowledgement
    Implicit,
    /// Request sent, waiting for `authaccept`
    Pending,
    Authenticated(SessionTokens),
    /// The auth timeout elapsed before `authaccept`
    Failed,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_) | AuthState::Implicit)
    }

    pub fn tokens(&self) -> Option<&SessionTokens> {
        match self {
            AuthState::Authenticated(tokens) => Some(tokens),
            _ => None,
        }
    }
}

/// What an `authaccept` did to the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Authenticated(SessionTokens),
    /// Arrived while idle, implicit or failed; carries the state it was ignored in
    Ignored(AuthState),
}

#[derive(Debug, Clone, Copy)]
enum Acknowledgement {
    None,
    Required { timeout: Option<Duration> },
}

#[derive(Debug)]
pub struct AuthHandshake {
    credentials: Credentials,
    accepts: AcceptTags,
    acknowledgement: Acknowledgement,
    state: AuthState,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl AuthHandshake {
    /// Handshake for the control plane: sending the request is the whole exchange
    pub fn implicit(credentials: Credentials, accepts: AcceptTags) -> Self {
        Self {
            credentials,
            accepts,
            acknowledgement: Acknowledgement::None,
            state: AuthState::Idle,
            deadline: None,
        }
    }

    /// Handshake for the app bridge: waits for `authaccept`, up to `timeout`
    pub fn acknowledged(
        credentials: Credentials,
        accepts: AcceptTags,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            credentials,
            accepts,
            acknowledgement: Acknowledgement::Required { timeout },
            state: AuthState::Idle,
            deadline: None,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn request(&self) -> Envelope {
        Envelope::auth_request(&self.credentials, &self.accepts)
    }

    /// A transport connection came up. Returns the request to send first.
    pub fn on_connected(&mut self) -> Envelope {
        match self.acknowledgement {
            Acknowledgement::None => {
                self.state = AuthState::Implicit;
                self.deadline = None;
            }
            Acknowledgement::Required { timeout } => {
                self.state = AuthState::Pending;
                self.deadline = timeout.map(|t| Box::pin(sleep(t)));
            }
        }
        self.request()
    }

    /// Valid while pending; a repeat accept on an authenticated connection
    /// replaces the stored tokens.
    pub fn on_accept(&mut self, envelope: &Envelope) -> AcceptOutcome {
        if !matches!(self.state, AuthState::Pending | AuthState::Authenticated(_)) {
            return AcceptOutcome::Ignored(self.state.clone());
        }
        let tokens = SessionTokens::from_accept(envelope);
        self.state = AuthState::Authenticated(tokens.clone());
        self.deadline = None;
        AcceptOutcome::Authenticated(tokens)
    }

    /// The deadline fired. Returns true when this moved the handshake to `Failed`.
    pub fn on_timeout(&mut self) -> bool {
        self.deadline = None;
        if self.state == AuthState::Pending {
            self.state = AuthState::Failed;
            return true;
        }
        false
    }

    /// The connection went away
    pub fn reset(&mut self) {
        self.state = AuthState::Idle;
        self.deadline = None;
    }

    /// Resolves when the auth deadline passes; never while none is armed
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => pending::<()>().await,
        }
    }
}
