//! Access token handling for Roomlink.
//!
//! 1. **Validation**: decoding a credential's claims and checking it has
//!    enough life left ([`Token`], [`TokenGuardian`])
//! 2. **Refresh scheduling**: one deadline per token, fired from the
//!    session actor's select loop
//! 3. **Caching**: a room-scoped slot in an injected [`KeyValueStore`]
//! 4. **Replacement**: the [`CredentialSource`] hook the controller calls
//!    when a refresh is due
//!
//! ```text
//! Session controller (above)  ← accepts, refreshes and caches tokens
//!     ↕
//! Token layer (this crate)
//!     ↕
//! Protocol layer (below)  ← ParticipantId, RoomName, TokenGrant
//! ```

mod error;
mod guardian;
mod source;
mod store;
mod token;

pub use error::{StoreError, TokenError};
pub use guardian::{refresh_delay, TokenConfig, TokenGuardian};
pub use source::{CredentialSource, NoCredentialSource};
pub use store::{FileStore, KeyValueStore, MemoryStore, TokenCache};
pub use token::Token;
