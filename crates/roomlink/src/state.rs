//! The session state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
///
/// ```text
///         connect                ok / Connected
/// Idle ───────────► Connecting ──────────────────► Connected
///                       │                           │    ▲
///                       │            interruption   ▼    │ resumed
///                       │                       Reconnecting
///                       │                           │
///                       └──────────┬────────────────┘
///                                  ▼
///                       Disconnected | Failed
/// ```
///
/// `Disconnected` and `Failed` are terminal for a session; the next
/// `connect` starts a new session from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
}

impl SessionState {
    /// Returns `true` if the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Returns `true` while a connection is being established or held.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }

    /// Returns `true` if moving to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Connected | Disconnected | Failed)
                | (Connected, Reconnecting | Disconnected | Failed)
                | (Reconnecting, Connected | Disconnected | Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    const ALL: [SessionState; 6] = [Idle, Connecting, Connected, Reconnecting, Disconnected, Failed];

    #[test]
    fn test_can_transition_to_happy_path() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
    }

    #[test]
    fn test_can_transition_to_rejects_skips() {
        assert!(!Idle.can_transition_to(Connected));
        assert!(!Idle.can_transition_to(Reconnecting));
        assert!(!Connecting.can_transition_to(Reconnecting));
        assert!(!Connected.can_transition_to(Connecting));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Disconnected, Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_every_live_state_can_fail_or_disconnect() {
        for from in ALL.into_iter().filter(|s| s.is_live()) {
            assert!(from.can_transition_to(Failed));
            assert!(from.can_transition_to(Disconnected));
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Reconnecting.to_string(), "Reconnecting");
    }
}
