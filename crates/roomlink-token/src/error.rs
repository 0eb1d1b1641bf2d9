//! Error types for the token layer.

use std::time::Duration;

use roomlink_protocol::ProtocolError;

/// Why a credential was not accepted.
///
/// Every rejection collapses to one of two meanings for the caller:
/// the credential is unusable (`Invalid`) or it is usable but too close
/// to its expiry (`Expired`).
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The credential is not a well-formed token: wrong segment count,
    /// undecodable payload, or no `exp` claim.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// The token expires in less than the configured minimum validity.
    #[error("token expired or expiring (remaining {remaining:?})")]
    Expired { remaining: Duration },

    /// The credential source could not produce a replacement.
    #[error("credential source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file holds something other than a string map.
    #[error("store contents unreadable: {0}")]
    Codec(#[from] ProtocolError),
}
