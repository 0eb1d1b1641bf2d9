//! Who is in the room, as far as this client knows.
//!
//! [`RosterTracker`] folds participant join/leave events into a map keyed
//! by [`ParticipantId`](roomlink_protocol::ParticipantId). Both operations
//! are idempotent, so duplicated or reordered delivery can't produce a
//! duplicate entry or a negative count. Consumers read immutable
//! [`Roster`] snapshots.

mod roster;

pub use roster::{Roster, RosterTracker};
