//! Transit Session - control plane and app bridge connections for IoTransit applets
//!
//! A [`Session`] keeps two authenticated WebSocket channels up: the control
//! plane (commands, events, remote configuration) and the app bridge
//! (application messages after an `authaccept` handshake). Everything that
//! happens on either channel is reported as a [`SessionEvent`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), transit_session::SessionError> {
//! use transit_session::{Session, SessionEvent};
//!
//! let session = Session::new("weather")?;
//! let mut events = session.subscribe();
//! session.connect();
//!
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::Command(command) = &event {
//!         println!("{} {}", command.name, command.args);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod event;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod settings;
pub mod transport;

pub use auth::{AuthHandshake, AuthState, SessionTokens};
pub use channel::{ChannelManager, ChannelSnapshot, LinkStatus};
pub use envelope::Envelope;
pub use error::{SessionError, SessionResult};
pub use event::{ChannelKind, CommandEvent, EventBus, SessionEvent};
pub use reconnect::ReconnectScheduler;
pub use router::{MessageRouter, RouteResult};
pub use session::Session;
pub use settings::{RemoteConfigError, RemoteSettings, SettingsUpdate};
pub use transport::{
    ChannelEndpoint, Connection, Connector, Frame, MemoryConnector, MemoryPeer, MemoryServer,
    TransportError, WsConnector,
};
