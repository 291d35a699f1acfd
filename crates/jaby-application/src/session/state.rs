use strum::{AsRefStr, Display};

/// Lifecycle of a user's session.
///
/// `Unloaded -> Active -> Draining -> Retired`; `Draining -> Active` when a
/// connection returns inside the grace window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    /// No compiled session (never attached, or compilation failed).
    #[default]
    Unloaded,
    /// At least one live connection.
    Active,
    /// No connections left; facts saved, retirement pending.
    Draining,
    /// Flow disposed; the user's entry is gone.
    Retired,
}

/// Result of attaching a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new session was compiled for the user.
    Created { session_id: String },
    /// The user already had an active session.
    Joined { session_id: String },
    /// A draining session was picked up again before retirement.
    Resumed { session_id: String },
    /// Compilation failed; the connection is registered but has no session.
    Degraded { reason: String },
}

impl AttachOutcome {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Created { session_id }
            | Self::Joined { session_id }
            | Self::Resumed { session_id } => Some(session_id),
            Self::Degraded { .. } => None,
        }
    }
}

/// Result of detaching a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachOutcome {
    /// The connection was not registered for the user.
    NotAttached,
    /// Other connections keep the session active.
    Remaining(usize),
    /// Last connection gone; the session is saved and scheduled to retire.
    Draining { session_id: String },
    /// Last connection gone from a user that never had a session.
    Released,
}
