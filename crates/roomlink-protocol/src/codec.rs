//! Codec trait and the JSON implementation.
//!
//! The signalling transport and the file-backed token store both need to
//! move typed values through bytes. They go through [`Codec`] so neither
//! hard-codes the format.

use serde::{de::DeserializeOwned, Serialize};

use crate::{ProtocolError, TokenGrant};

/// Encodes values to bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes a credential endpoint response and checks it is usable.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] when the token field is blank.
    fn decode_grant(&self, data: &[u8]) -> Result<TokenGrant, ProtocolError> {
        let grant: TokenGrant = self.decode(data)?;
        if grant.token.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "token grant carries an empty token".into(),
            ));
        }
        Ok(grant)
    }
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use roomlink_protocol::{Codec, JsonCodec, TransportEvent};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&TransportEvent::Reconnecting).unwrap();
/// let back: TransportEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(back, TransportEvent::Reconnecting);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
