use roomlink_protocol::RawError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The room service answered but refused the link (bad token,
    /// missing grant, room closed, ...).
    #[error("rejected by room service: {0}")]
    Rejected(RawError),

    /// The network connection could not be opened.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Flattens the error into the form the error classifier reads.
    pub fn to_raw(&self) -> RawError {
        match self {
            Self::Rejected(raw) => raw.clone(),
            Self::ConnectFailed(e) | Self::SendFailed(e) => {
                RawError::message(format!("network error: {e}"))
                    .with_name(format!("{:?}", e.kind()))
            }
            Self::ConnectionClosed(reason) => {
                RawError::message(format!("connection closed: {reason}"))
            }
            Self::Shutdown => RawError::message("transport shut down"),
        }
    }
}
