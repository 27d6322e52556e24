//! Session connection state machine.
//!
//! Provides a `ConnectionPhase` enum that models the lifecycle of the
//! single server connection, with validated transitions that return
//! `Result` instead of panicking.

use std::time::Instant;

use crate::error::EqError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of the server connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲             │   ▲            │
///       │             └───┘ (retry)    │
///       └─────────────┴────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No active connection. Initial / terminal state.
    #[default]
    Disconnected,

    /// Socket connect in progress.
    Connecting {
        /// 1-based attempt number.
        attempt: u32,
    },

    /// Socket is up and the read loop is running.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting { attempt } => write!(f, "Connecting (attempt {attempt})"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

impl ConnectionPhase {
    /// Returns `true` when the socket is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` when the connection is in its idle state.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the connection has been in the `Connected` state.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), EqError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting { attempt: 1 };
                Ok(())
            }
            _ => Err(EqError::InvalidState(format!(
                "cannot connect while {self}"
            ))),
        }
    }

    /// Re-enter `Connecting` after a retryable failure.
    ///
    /// Falls back to `Disconnected` and returns `false` once `budget`
    /// attempts have been used.
    pub fn retry_connect(&mut self, budget: u32) -> bool {
        match self {
            Self::Connecting { attempt } if *attempt < budget => {
                *attempt += 1;
                true
            }
            _ => {
                *self = Self::Disconnected;
                false
            }
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), EqError> {
        match self {
            Self::Connecting { .. } => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(EqError::InvalidState(format!(
                "cannot complete connect while {self}"
            ))),
        }
    }

    /// Force-reset to `Disconnected`.
    ///
    /// Returns `true` if the phase actually changed, which callers use to
    /// emit exactly one disconnect notification per close.
    pub fn disconnect(&mut self) -> bool {
        let changed = !self.is_disconnected();
        *self = Self::Disconnected;
        changed
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = ConnectionPhase::Disconnected;

        phase.begin_connect().unwrap();
        assert_eq!(phase, ConnectionPhase::Connecting { attempt: 1 });

        phase.complete_connect().unwrap();
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());

        assert!(phase.disconnect());
        assert!(phase.is_disconnected());
    }

    #[test]
    fn invalid_transition_connect_when_connected() {
        let mut phase = ConnectionPhase::Connected {
            since: Instant::now(),
        };
        assert!(phase.begin_connect().is_err());
    }

    #[test]
    fn invalid_transition_complete_from_disconnected() {
        let mut phase = ConnectionPhase::Disconnected;
        assert!(phase.complete_connect().is_err());
    }

    #[test]
    fn retry_stays_connecting_until_budget() {
        let mut phase = ConnectionPhase::Disconnected;
        phase.begin_connect().unwrap();

        assert!(phase.retry_connect(3));
        assert_eq!(phase, ConnectionPhase::Connecting { attempt: 2 });
        assert!(phase.retry_connect(3));
        assert_eq!(phase, ConnectionPhase::Connecting { attempt: 3 });
        assert!(!phase.retry_connect(3));
        assert!(phase.is_disconnected());
    }

    #[test]
    fn disconnect_reports_change_once() {
        let mut phase = ConnectionPhase::Connected {
            since: Instant::now(),
        };
        assert!(phase.disconnect());
        assert!(!phase.disconnect());
    }

    #[test]
    fn display_format() {
        assert_eq!(ConnectionPhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(
            ConnectionPhase::Connecting { attempt: 2 }.to_string(),
            "Connecting (attempt 2)"
        );
        assert_eq!(
            ConnectionPhase::Connected {
                since: Instant::now()
            }
            .to_string(),
            "Connected"
        );
    }

    #[test]
    fn default_phase_is_disconnected() {
        let phase = ConnectionPhase::default();
        assert!(phase.is_disconnected());
    }
}
