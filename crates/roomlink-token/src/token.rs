//! The validated token and the claims decoded from it.
//!
//! A room access token is a JWT: `header.payload.signature`, each segment
//! base64url-encoded. The client cannot check the signature (it has no
//! key) and doesn't need to; the room service does that. What the client
//! needs is the payload's `exp` claim, so it knows when to refresh.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use roomlink_protocol::{ParticipantId, RoomName};
use serde::Deserialize;

use crate::TokenError;

#[derive(Debug, Deserialize)]
struct VideoGrant {
    #[serde(default)]
    room: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    video: Option<VideoGrant>,
}

/// An access token whose structure has been checked.
///
/// Never mutated: a refresh produces a new `Token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    identity: Option<ParticipantId>,
    room_name: Option<RoomName>,
    issued_at: SystemTime,
    expires_at: SystemTime,
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| TokenError::Invalid(format!("segment is not base64url: {e}")))
}

impl Token {
    /// Decodes `raw` without judging how long it has left.
    ///
    /// `now` stands in for `issued_at` when the token has no `iat` claim.
    ///
    /// # Errors
    /// [`TokenError::Invalid`] when the token is not three segments, the
    /// header or payload is not base64url JSON, or `exp` is missing.
    pub fn parse(raw: &str, now: SystemTime) -> Result<Self, TokenError> {
        let segments: Vec<&str> = raw.trim().split('.').collect();
        let [header, payload, _signature] = segments.as_slice() else {
            return Err(TokenError::Invalid(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };
        if header.is_empty() || payload.is_empty() {
            return Err(TokenError::Invalid("empty header or payload".into()));
        }

        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(
            &decode_segment(header)?,
        )
        .map_err(|e| TokenError::Invalid(format!("header is not a JSON object: {e}")))?;

        let claims: Claims = serde_json::from_slice(&decode_segment(payload)?)
            .map_err(|e| TokenError::Invalid(format!("payload is not valid claims: {e}")))?;

        let exp = claims
            .exp
            .ok_or_else(|| TokenError::Invalid("payload has no exp claim".into()))?;

        Ok(Self {
            raw: raw.trim().to_owned(),
            identity: claims.sub.map(ParticipantId),
            room_name: claims.video.and_then(|v| v.room).map(RoomName),
            issued_at: claims
                .iat
                .map(|iat| UNIX_EPOCH + Duration::from_secs(iat))
                .unwrap_or(now),
            expires_at: UNIX_EPOCH + Duration::from_secs(exp),
        })
    }

    /// The credential exactly as it should be presented to the transport.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The `sub` claim, if present.
    pub fn identity(&self) -> Option<&ParticipantId> {
        self.identity.as_ref()
    }

    /// The room from the `video.room` grant, if present.
    pub fn room_name(&self) -> Option<&RoomName> {
        self.room_name.as_ref()
    }

    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Time left before expiry as seen at `now`; zero once expired.
    pub fn remaining_at(&self, now: SystemTime) -> Duration {
        self.expires_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}
