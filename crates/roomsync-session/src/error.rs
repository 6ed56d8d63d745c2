//! Error types for the session layer.

use crate::SessionState;

/// Errors raised by the room session state machine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The requested operation is not legal in the current state, e.g.
    /// connecting a session that is already active.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The [`IdentityProvider`](crate::IdentityProvider) could not say who
    /// the user is.
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(String),
}
