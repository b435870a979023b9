//! Session lifecycle state machine.
//!
//! ```text
//! Idle ──start──▶ Registering ──serving──▶ Serving ──stop──▶ Cleaning ──cleaned──▶ Stopped
//!                      │                                                            ▲
//!                      └──────────────────── registration failed ───────────────────┘
//! ```
//!
//! `Stopped` is terminal.

use std::fmt;

use thiserror::Error;

/// Lifecycle state of a responder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Constructed, nothing contacted yet.
    Idle,
    /// Creating the webhook and binding listeners.
    Registering,
    /// Hook registered, listeners accepting deliveries.
    Serving,
    /// Listeners draining and hook deletion in progress.
    Cleaning,
    /// Terminal.
    Stopped,
}

/// Things that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Start,
    ServingStarted,
    RegistrationFailed,
    Stop,
    Cleaned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {transition:?} while {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub transition: SessionTransition,
}

impl SessionState {
    /// Applies a transition, returning the resulting state.
    pub fn apply(self, transition: SessionTransition) -> Result<SessionState, InvalidTransition> {
        use SessionState::*;
        use SessionTransition::*;

        match (self, transition) {
            (Idle, Start) => Ok(Registering),
            (Registering, ServingStarted) => Ok(Serving),
            (Registering, RegistrationFailed) => Ok(Stopped),
            (Serving, Stop) => Ok(Cleaning),
            (Cleaning, Cleaned) => Ok(Stopped),
            (from, transition) => Err(InvalidTransition { from, transition }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Whether a registered hook may exist in this state.
    pub fn holds_registration(&self) -> bool {
        matches!(self, SessionState::Serving | SessionState::Cleaning)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Registering => "registering",
            SessionState::Serving => "serving",
            SessionState::Cleaning => "cleaning",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
