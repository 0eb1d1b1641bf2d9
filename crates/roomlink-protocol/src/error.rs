//! Error types for the protocol layer.

/// Errors raised while turning wire bytes into Roomlink types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not valid JSON for the expected type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks a protocol rule
    /// (e.g. a token grant with an empty token).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
