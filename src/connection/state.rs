//! Connection lifecycle as a closed state machine.
//!
//! ```text
//! Connecting ──> Open ──> Closing ──> Closed
//!     │           │                     ▲
//!     └───────────┴─────────────────────┘
//! ```
//!
//! `Closed` is terminal. Whether this side asked for the close is carried by
//! the `Closing` variant itself, so it cannot drift from the state.

use crate::error::{Error, Result};

/// WebSocket connection state.
///
/// The public, read-only view of a connection's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Handshake completed, frames flow both ways.
    Open,
    /// A close frame has been sent or received.
    Closing,
    /// Socket released.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for every state but `Closed`.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Returns `true` only for `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Returns `true` for `Open` or `Closing`.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Internal lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Connecting,
    Open,
    Closing {
        /// This side sent the first close frame.
        initiated_locally: bool,
    },
    Closed,
}

impl From<Phase> for ConnectionState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Open => ConnectionState::Open,
            Phase::Closing { .. } => ConnectionState::Closing,
            Phase::Closed => ConnectionState::Closed,
        }
    }
}

/// Guards every lifecycle transition of one connection.
#[derive(Debug, Default)]
pub struct StateMachine {
    phase: Phase,
}

impl StateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.phase.into()
    }

    /// Whether this side has already sent a close frame.
    #[must_use]
    pub fn close_requested(&self) -> bool {
        matches!(
            self.phase,
            Phase::Closing {
                initiated_locally: true
            }
        )
    }

    /// `Connecting -> Open` after a successful handshake.
    pub fn open(&mut self) -> Result<()> {
        match self.phase {
            Phase::Connecting => {
                self.phase = Phase::Open;
                Ok(())
            }
            _ => Err(self.invalid(ConnectionState::Open)),
        }
    }

    /// `Open -> Closing` when a close frame is sent or received.
    pub fn begin_close(&mut self, initiated_locally: bool) -> Result<()> {
        match self.phase {
            Phase::Open => {
                self.phase = Phase::Closing { initiated_locally };
                Ok(())
            }
            _ => Err(self.invalid(ConnectionState::Closing)),
        }
    }

    /// Move to `Closed` from any state.
    ///
    /// Returns the prior state, or `None` if already closed.
    pub fn close(&mut self) -> Option<ConnectionState> {
        if self.phase == Phase::Closed {
            return None;
        }
        let prior = self.state();
        self.phase = Phase::Closed;
        Some(prior)
    }

    fn invalid(&self, to: ConnectionState) -> Error {
        Error::InvalidStateTransition {
            from: self.state(),
            to,
        }
    }
}
