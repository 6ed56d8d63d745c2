//! The session lifecycle state machine.

use std::fmt;

/// Where one client stands in its participation in one room.
///
/// ```text
/// Disconnected → Connecting → Joining → Active → Leaving → Disconnected
///                     │           │         │
///                     └───────────┴─────────┴──(connection failure)──→ Disconnected
/// ```
///
/// A transport reconnect while `Active` re-announces presence and goes back
/// to `Joining`, since the broker assigns a fresh session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Joining,
    Active,
    Leaving,
}

impl SessionState {
    /// Returns `true` once a JOIN has been announced and until leave starts.
    pub fn is_present(self) -> bool {
        matches!(self, Self::Joining | Self::Active)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Joining)
                | (Connecting, Disconnected)
                | (Joining, Active)
                | (Active, Joining)
                | (Joining, Leaving)
                | (Active, Leaving)
                | (Joining, Disconnected)
                | (Active, Disconnected)
                | (Leaving, Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Joining => "Joining",
            Self::Active => "Active",
            Self::Leaving => "Leaving",
        };
        f.write_str(name)
    }
}
