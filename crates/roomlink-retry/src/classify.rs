//! Raw failure → category.
//!
//! [`classify`] is the only place that decides whether a failure is worth
//! retrying. It is total: anything it doesn't recognise is `Unknown`.

use std::fmt;

use roomlink_protocol::RawError;
use serde::{Deserialize, Serialize};

/// What kind of failure a [`RawError`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The credential was refused. Fatal.
    Auth,
    /// The participant may not do what it tried (join, publish, use a
    /// device). Fatal.
    Permission,
    /// Connectivity trouble. Retryable.
    Network,
    /// A local media device failed. Retryable.
    Device,
    /// Unrecognised. Retryable, at a higher attempt cost.
    Unknown,
}

impl ErrorCategory {
    /// `true` for categories that end the session outright.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Auth | Self::Permission)
    }

    pub fn is_retryable(self) -> bool {
        !self.is_fatal()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Network => "network",
            Self::Device => "device",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

const AUTH_HINTS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "authentication",
    "invalid token",
    "token expired",
    "token is expired",
    "jwt",
    "invalid api key",
];

const PERMISSION_HINTS: &[&str] = &[
    "permission",
    "forbidden",
    "not allowed",
    "denied",
    "insufficient",
];

const DEVICE_HINTS: &[&str] = &[
    "device",
    "camera",
    "microphone",
    "getusermedia",
    "could not start",
    "media source",
    "track ended",
];

const NETWORK_HINTS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "websocket",
    "socket",
    "offline",
    "unreachable",
    "dns",
    "ice",
    "signal",
];

fn by_code(code: u16) -> Option<ErrorCategory> {
    match code {
        401 => Some(ErrorCategory::Auth),
        403 => Some(ErrorCategory::Permission),
        408 | 425 | 429 | 500..=599 => Some(ErrorCategory::Network),
        _ => None,
    }
}

fn by_name(name: &str) -> Option<ErrorCategory> {
    match name {
        "NotAllowedError" | "SecurityError" | "PermissionDenied" => {
            Some(ErrorCategory::Permission)
        }
        "NotFoundError" | "NotReadableError" | "OverconstrainedError"
        | "DevicesNotFoundError" | "TrackStartError" => Some(ErrorCategory::Device),
        "NetworkError" | "TimeoutError" | "TimedOut" | "ConnectionRefused"
        | "ConnectionReset" | "ConnectionAborted" | "NotConnected" | "BrokenPipe"
        | "UnexpectedEof" => Some(ErrorCategory::Network),
        _ => None,
    }
}

/// `true` if `hint` occurs in `message` starting at a word boundary.
///
/// "ICE failed" and "timeouts" match; "service" and "invoice" do not
/// match "ice".
fn has_word(message: &str, hint: &str) -> bool {
    message.match_indices(hint).any(|(at, _)| {
        message[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric())
    })
}

fn by_message(message: &str) -> Option<ErrorCategory> {
    let message = message.to_ascii_lowercase();
    let hit = |hints: &[&str]| hints.iter().any(|h| has_word(&message, h));
    // Order matters: "permission denied for camera" is a permission
    // failure.
    if hit(AUTH_HINTS) {
        Some(ErrorCategory::Auth)
    } else if hit(PERMISSION_HINTS) {
        Some(ErrorCategory::Permission)
    } else if hit(DEVICE_HINTS) {
        Some(ErrorCategory::Device)
    } else if hit(NETWORK_HINTS) {
        Some(ErrorCategory::Network)
    } else {
        None
    }
}

/// Maps a raw failure to exactly one [`ErrorCategory`].
///
/// Status code wins over error name, which wins over message text.
pub fn classify(error: &RawError) -> ErrorCategory {
    error
        .code
        .and_then(by_code)
        .or_else(|| error.name.as_deref().and_then(by_name))
        .or_else(|| by_message(&error.message))
        .unwrap_or(ErrorCategory::Unknown)
}
