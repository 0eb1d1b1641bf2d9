//! The roster tracker and the snapshots it hands out.
//!
//! Participant events can arrive more than once (a transport replays its
//! joins after resuming) and out of order (a leave racing the join it
//! undoes). The tracker therefore treats both events as set operations
//! on a map keyed by participant id:
//!
//! - join → insert or overwrite. A second join for the same id updates
//!   the entry in place; it never adds a row.
//! - leave → remove if present. Leaving twice, or leaving before ever
//!   joining, is a no-op.
//!
//! Both return whether anything changed, so the session actor only
//! publishes an update when the visible roster actually moved.
//!
//! ## Why snapshots
//!
//! The tracker lives inside the actor and is mutated on every event.
//! Subscribers on other tasks get a [`Roster`] instead: a frozen,
//! id-ordered slice behind an `Arc`. Cloning it into every
//! `SessionUpdate` costs one reference count, and a subscriber holding an
//! old snapshot never observes a later change.

use std::collections::BTreeMap;
use std::sync::Arc;

use roomlink_protocol::{Participant, ParticipantId, TransportEvent};

/// An immutable, id-ordered view of the roster at one moment.
///
/// Cheap to clone (one `Arc`), and iterating it twice yields the same
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Roster {
    participants: Arc<[Participant]>,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Participant> {
        self.participants.iter()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants
            .binary_search_by(|p| p.id.cmp(id))
            .ok()
            .map(|i| &self.participants[i])
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.get(id).is_some()
    }

    /// Ids in roster order.
    pub fn ids(&self) -> Vec<&ParticipantId> {
        self.iter().map(|p| &p.id).collect()
    }

    /// The local participant, once the transport has reported it.
    pub fn local(&self) -> Option<&Participant> {
        self.iter().find(|p| p.is_local)
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a Participant;
    type IntoIter = std::slice::Iter<'a, Participant>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Mutable roster state, owned by the session actor.
#[derive(Debug, Default)]
pub struct RosterTracker {
    participants: BTreeMap<ParticipantId, Participant>,
}

impl RosterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `participant` unless its id is already present.
    ///
    /// Returns `true` if the roster changed.
    pub fn apply_join(&mut self, participant: Participant) -> bool {
        if self.participants.contains_key(&participant.id) {
            tracing::debug!(participant = %participant.id, "duplicate join ignored");
            return false;
        }
        tracing::info!(
            participant = %participant.id,
            local = participant.is_local,
            "participant joined"
        );
        self.participants.insert(participant.id.clone(), participant);
        true
    }

    /// Removes `id` if present. Returns `true` if the roster changed.
    pub fn apply_leave(&mut self, id: &ParticipantId) -> bool {
        if self.participants.remove(id).is_some() {
            tracing::info!(participant = %id, "participant left");
            true
        } else {
            tracing::debug!(participant = %id, "leave for unknown participant ignored");
            false
        }
    }

    /// Applies a transport event if it is a roster event.
    ///
    /// Returns `true` if the roster changed; other events are ignored.
    pub fn apply_event(&mut self, event: &TransportEvent) -> bool {
        match event {
            TransportEvent::ParticipantJoined { participant } => {
                self.apply_join(participant.clone())
            }
            TransportEvent::ParticipantLeft { id } => self.apply_leave(id),
            _ => false,
        }
    }

    /// Copies the current roster into an immutable [`Roster`].
    pub fn snapshot(&self) -> Roster {
        Roster {
            participants: self.participants.values().cloned().collect(),
        }
    }

    /// Empties the roster (session teardown).
    pub fn clear(&mut self) {
        self.participants.clear();
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use roomlink_protocol::MediaKind;

    use super::*;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    #[test]
    fn test_apply_join_new_participant_inserts() {
        let mut roster = RosterTracker::new();
        assert!(roster.apply_join(Participant::remote("alice", "Alice")));
        assert_eq!(roster.len(), 1);
        assert!(roster.contains(&pid("alice")));
    }

    #[test]
    fn test_apply_join_twice_keeps_single_entry() {
        let mut roster = RosterTracker::new();
        roster.apply_join(Participant::remote("alice", "Alice"));

        let changed = roster.apply_join(Participant::remote("alice", "Alice"));

        assert!(!changed);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.snapshot().ids(), vec![&pid("alice")]);
    }

    #[test]
    fn test_apply_join_duplicate_keeps_first_entry() {
        let mut roster = RosterTracker::new();
        roster.apply_join(Participant::remote("alice", "Alice"));
        roster.apply_join(Participant::remote("alice", "Impostor").with_media(MediaKind::Video));

        let snapshot = roster.snapshot();
        let alice = snapshot.get(&pid("alice")).unwrap();
        assert_eq!(alice.display_name, "Alice");
        assert!(alice.media.is_empty());
    }

    #[test]
    fn test_apply_leave_unknown_is_noop() {
        let mut roster = RosterTracker::new();
        assert!(!roster.apply_leave(&pid("ghost")));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_apply_leave_twice_never_goes_negative() {
        let mut roster = RosterTracker::new();
        roster.apply_join(Participant::remote("alice", "Alice"));

        assert!(roster.apply_leave(&pid("alice")));
        assert!(!roster.apply_leave(&pid("alice")));
        assert_eq!(roster.len(), 0);
    }

    #[test]
    fn test_apply_event_ignores_non_roster_events() {
        let mut roster = RosterTracker::new();
        assert!(!roster.apply_event(&TransportEvent::Reconnecting));
        assert!(roster.apply_event(&TransportEvent::ParticipantJoined {
            participant: Participant::remote("bob", "Bob"),
        }));
        assert!(roster.apply_event(&TransportEvent::ParticipantLeft { id: pid("bob") }));
    }

    #[test]
    fn test_snapshot_is_id_ordered_and_restartable() {
        let mut roster = RosterTracker::new();
        roster.apply_join(Participant::remote("carol", "Carol"));
        roster.apply_join(Participant::local("alice", "Alice"));
        roster.apply_join(Participant::remote("bob", "Bob"));

        let snapshot = roster.snapshot();
        let first: Vec<_> = snapshot.iter().map(|p| p.id.as_str()).collect();
        let second: Vec<_> = (&snapshot).into_iter().map(|p| p.id.as_str()).collect();

        assert_eq!(first, vec!["alice", "bob", "carol"]);
        assert_eq!(first, second);
        assert_eq!(snapshot.local().map(|p| p.id.as_str()), Some("alice"));
    }

    #[test]
    fn test_snapshot_unaffected_by_later_changes() {
        let mut roster = RosterTracker::new();
        roster.apply_join(Participant::remote("alice", "Alice"));
        let before = roster.snapshot();

        roster.apply_join(Participant::remote("bob", "Bob"));
        roster.apply_leave(&pid("alice"));

        assert_eq!(before.ids(), vec![&pid("alice")]);
        assert_eq!(roster.snapshot().ids(), vec![&pid("bob")]);
    }

    #[test]
    fn test_clear_empties_roster() {
        let mut roster = RosterTracker::new();
        roster.apply_join(Participant::remote("alice", "Alice"));
        roster.clear();
        assert!(roster.snapshot().is_empty());
    }
}
