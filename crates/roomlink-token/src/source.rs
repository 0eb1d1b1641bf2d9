//! Hook for obtaining fresh credentials.
//!
//! Roomlink never mints tokens. Whoever does (your backend's token route,
//! an identity provider) is wrapped in a [`CredentialSource`], and the
//! session controller calls it when the current token's refresh deadline
//! arrives.

use std::future::Future;

use roomlink_protocol::{ParticipantId, RoomName, TokenGrant};

use crate::TokenError;

/// Produces a new access token for a room.
///
/// # Example
///
/// ```rust
/// use roomlink_protocol::{Codec, JsonCodec, ParticipantId, RoomName, TokenGrant};
/// use roomlink_token::{CredentialSource, TokenError};
///
/// /// Serves a canned response body, as an HTTP route would return it.
/// struct Canned(&'static [u8]);
///
/// impl CredentialSource for Canned {
///     async fn fetch(
///         &self,
///         _room: &RoomName,
///         _identity: Option<&ParticipantId>,
///     ) -> Result<TokenGrant, TokenError> {
///         JsonCodec
///             .decode_grant(self.0)
///             .map_err(|e| TokenError::SourceUnavailable(e.to_string()))
///     }
/// }
/// ```
pub trait CredentialSource: Send + Sync + 'static {
    /// Fetches a token for `room`, for `identity` when it is known.
    ///
    /// # Returns
    /// - `Ok(TokenGrant)`: a new credential; the caller still validates it
    /// - `Err(TokenError::SourceUnavailable)`: no credential right now
    fn fetch(
        &self,
        room: &RoomName,
        identity: Option<&ParticipantId>,
    ) -> impl Future<Output = Result<TokenGrant, TokenError>> + Send;
}

/// A source that never has anything; refresh falls back to notifying the
/// caller that the token expired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentialSource;

impl CredentialSource for NoCredentialSource {
    async fn fetch(
        &self,
        room: &RoomName,
        _identity: Option<&ParticipantId>,
    ) -> Result<TokenGrant, TokenError> {
        Err(TokenError::SourceUnavailable(format!(
            "no credential source configured for room {room}"
        )))
    }
}
