//! Shared vocabulary for Roomlink.
//!
//! - **Types** ([`Participant`], [`TransportEvent`], [`RawError`],
//!   [`TokenGrant`]): the data that flows between a transport, the
//!   session controller and its observers.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, typed values out.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (events) → Protocol (types) → Session controller
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    MediaKind, Participant, ParticipantId, RawError, RoomName, TokenGrant,
    TransportEvent,
};
