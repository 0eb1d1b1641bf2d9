//! # Roomlink
//!
//! Client-side controller for a real-time room session: it connects,
//! keeps the access token fresh, rides out transient network trouble and
//! tracks who else is in the room.
//!
//! The pieces, leaves first:
//!
//! - [`TokenGuardian`](roomlink_token::TokenGuardian): token validation
//!   and refresh scheduling
//! - [`classify`](roomlink_retry::classify): raw failure to
//!   [`ErrorCategory`](roomlink_retry::ErrorCategory)
//! - [`RosterTracker`](roomlink_roster::RosterTracker): idempotent
//!   participant set
//! - [`ReconnectionPolicy`](roomlink_retry::ReconnectionPolicy): retry or
//!   give up
//! - [`SessionConnector`]: the actor that drives a
//!   [`Transport`](roomlink_transport::Transport) and ties the rest
//!   together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomlink::prelude::*;
//!
//! # async fn run(token: &str) -> Result<(), RoomlinkError> {
//! let session = SessionConnector::builder(WebSocketTransport::new()).spawn();
//! session.connect(token, "wss://rooms.example.com/signal").await?;
//!
//! let mut watch = session.watch();
//! watch
//!     .wait_for(|u| u.state == SessionState::Connected)
//!     .await
//!     .map_err(|_| SessionError::Unavailable)?;
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connector;
mod error;
mod state;
mod update;

pub use config::{ConnectorConfig, ExhaustionOutcome};
pub use connector::{SessionConnector, SessionConnectorBuilder, SessionHandle};
pub use error::{RoomlinkError, SessionError};
pub use state::SessionState;
pub use update::{SessionUpdate, UpdateSummary};

pub use roomlink_protocol as protocol;
pub use roomlink_retry as retry;
pub use roomlink_roster as roster;
pub use roomlink_token as token;
pub use roomlink_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        ConnectorConfig, ExhaustionOutcome, RoomlinkError, SessionConnector, SessionError,
        SessionHandle, SessionState, SessionUpdate,
    };
    pub use roomlink_protocol::{MediaKind, Participant, ParticipantId, RawError, RoomName};
    pub use roomlink_retry::{DelayStrategy, ErrorCategory, RetryConfig};
    pub use roomlink_roster::Roster;
    pub use roomlink_token::{
        CredentialSource, FileStore, KeyValueStore, MemoryStore, TokenConfig, TokenError,
    };
    pub use roomlink_transport::{ConnectOutcome, LoopbackTransport, Transport, WebSocketTransport};
}
