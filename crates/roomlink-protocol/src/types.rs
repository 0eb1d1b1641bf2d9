//! Core types shared by every Roomlink layer.
//!
//! Everything here is plain data: who is in a room, what a transport
//! reported, and what the credential endpoint hands back. None of these
//! types know about timers, state machines or connections.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identifier for a participant, as assigned by the room service.
///
/// Newtype over `String` so a participant id can't be confused with a
/// room name or a raw token. Serializes as the bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Creates an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the id as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the room a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(pub String);

impl RoomName {
    /// Creates a room name from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrows the name as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// A kind of media a participant publishes into the room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Audio,
    Video,
    ScreenShare,
    Data,
}

/// One participant as seen by the local client.
///
/// `media` is a `BTreeSet` so two participants with the same tracks
/// compare equal regardless of publish order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Stable id, unique within a room.
    pub id: ParticipantId,
    /// Human-readable name shown in the UI.
    pub display_name: String,
    /// `true` for the participant this client is connected as.
    #[serde(default)]
    pub is_local: bool,
    /// Media kinds currently published.
    #[serde(default)]
    pub media: BTreeSet<MediaKind>,
}

impl Participant {
    /// A remote participant with no published media.
    pub fn remote(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.into(),
            is_local: false,
            media: BTreeSet::new(),
        }
    }

    /// The local participant with no published media.
    pub fn local(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_local: true,
            ..Self::remote(id, display_name)
        }
    }

    /// Builder-style helper that adds a published media kind.
    pub fn with_media(mut self, kind: MediaKind) -> Self {
        self.media.insert(kind);
        self
    }
}

// ---------------------------------------------------------------------------
// Raw transport failures
// ---------------------------------------------------------------------------

/// A failure exactly as the transport reported it, before classification.
///
/// Transports fill in whatever they have: an HTTP-ish status `code`, an
/// error `name` (browser-style `NotAllowedError`, `NotFoundError`, ...)
/// and a free-form `message`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl RawError {
    /// An error carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Adds a status code.
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds an error name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.code) {
            (Some(name), Some(code)) => write!(f, "{name} ({code}): {}", self.message),
            (Some(name), None) => write!(f, "{name}: {}", self.message),
            (None, Some(code)) => write!(f, "({code}) {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// TransportEvent
// ---------------------------------------------------------------------------

/// Everything a transport can tell the controller about the room link.
///
/// Internally tagged so the JSON form reads
/// `{"type": "participantLeft", "id": "alice"}`, which is what the
/// WebSocket signalling transport receives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    /// The link to the room is established.
    Connected,

    /// The link dropped. `reason` is `None` for a clean close.
    Disconnected {
        #[serde(default)]
        reason: Option<RawError>,
    },

    /// The link is interrupted and the transport is trying to resume it.
    Reconnecting,

    /// A previously interrupted link resumed.
    Reconnected,

    /// Someone entered the room (possibly the local participant).
    ParticipantJoined { participant: Participant },

    /// Someone left the room.
    ParticipantLeft { id: ParticipantId },

    /// A failure that does not by itself close the link.
    Error { error: RawError },
}

// ---------------------------------------------------------------------------
// TokenGrant
// ---------------------------------------------------------------------------

/// What the credential endpoint returns: `{"token": "...", "expiresInSeconds": 600}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// The signed credential, passed to the transport as-is.
    pub token: String,
    /// Lifetime the issuer advertises. Informational only: validity is
    /// always taken from the token's own `exp` claim.
    pub expires_in_seconds: u64,
}
