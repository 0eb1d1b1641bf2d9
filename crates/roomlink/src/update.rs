//! What observers receive.

use roomlink_roster::Roster;
use serde::Serialize;

use crate::{SessionError, SessionState};

/// A snapshot of the session, published after every change.
///
/// `generation` identifies the session the update belongs to; it grows
/// with every `connect` and every `disconnect`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub state: SessionState,
    pub roster: Roster,
    /// The error that accompanied this change, if any.
    pub error: Option<SessionError>,
    pub generation: u64,
}

impl SessionUpdate {
    pub(crate) fn initial() -> Self {
        Self {
            state: SessionState::Idle,
            roster: Roster::default(),
            error: None,
            generation: 0,
        }
    }

    /// Compact form for logs and wire forwarding.
    pub fn summary(&self) -> UpdateSummary {
        UpdateSummary {
            state: self.state,
            participants: self.roster.len(),
            error: self.error.as_ref().map(ToString::to_string),
            generation: self.generation,
        }
    }
}

/// Serializable digest of a [`SessionUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub state: SessionState,
    pub participants: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub generation: u64,
}
