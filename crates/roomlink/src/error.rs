//! Error types for the session controller, and the unified error for the
//! whole workspace.

use std::time::Duration;

use roomlink_protocol::ProtocolError;
use roomlink_retry::ErrorCategory;
use roomlink_token::{StoreError, TokenError};
use roomlink_transport::TransportError;

/// What went wrong with a session, as reported to callers and carried in
/// [`SessionUpdate::error`](crate::SessionUpdate::error).
///
/// Cheap to clone so every update subscriber gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The credential is malformed or has no expiry.
    #[error("token invalid: {0}")]
    TokenInvalid(String),

    /// The credential is expired, about to expire, or could not be
    /// replaced before it did.
    #[error("token expired: {0}")]
    TokenExpired(String),

    /// A connect attempt was refused or could not reach the room.
    #[error("connect failed ({category}{}): {message}", fatal_marker(.fatal))]
    ConnectFailed {
        category: ErrorCategory,
        fatal: bool,
        message: String,
    },

    /// The transport reported a failure on an established link.
    #[error("transport error ({category}): {message}")]
    Transport {
        category: ErrorCategory,
        message: String,
    },

    /// A connect attempt did not finish in time.
    #[error("connect attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Reconnection gave up.
    #[error("retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },

    /// The operation needs an active session and there is none.
    #[error("no active session")]
    NoSession,

    /// The connector task has stopped; the handle is dead.
    #[error("session connector is unavailable")]
    Unavailable,
}

fn fatal_marker(fatal: &bool) -> &'static str {
    if *fatal { ", fatal" } else { "" }
}

impl SessionError {
    /// The classifier's verdict, for errors that went through it.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::ConnectFailed { category, .. } | Self::Transport { category, .. } => {
                Some(*category)
            }
            Self::Timeout(_) => Some(ErrorCategory::Network),
            _ => None,
        }
    }

    /// Returns `true` if this error ended (or would end) the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ConnectFailed { fatal, .. } => *fatal,
            Self::Transport { category, .. } => category.is_fatal(),
            Self::RetryBudgetExhausted { .. } => true,
            _ => false,
        }
    }
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(reason) => Self::TokenInvalid(reason),
            TokenError::Expired { remaining } => {
                Self::TokenExpired(format!("{}ms of validity left", remaining.as_millis()))
            }
            TokenError::SourceUnavailable(reason) => {
                Self::TokenExpired(format!("no replacement: {reason}"))
            }
        }
    }
}

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` conversions let `?` lift any layer's error into this one.
#[derive(Debug, thiserror::Error)]
pub enum RoomlinkError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
