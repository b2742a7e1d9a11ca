//! Session lifecycle state machine.
//!
//! Provides a `SessionPhase` enum that models the lifecycle of the single
//! streaming session, with validated transitions that return `Result`
//! instead of panicking.

use std::time::Instant;

use crate::error::LumenError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of the streaming session.
///
/// ```text
///  Idle ──► Starting ──► Connected ──► Stopping ──► Idle
///   ▲           │
///   └───────────┘  (engine refused the connection)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session installed. Initial / terminal state.
    #[default]
    Idle,

    /// Session installed; the engine is bringing the connection up.
    Starting,

    /// Engine reported success; frames, audio and input flow.
    Connected {
        /// When the session entered the `Connected` state.
        since: Instant,
    },

    /// Teardown in progress; only cleanup callbacks are routed.
    Stopping,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SessionPhase {
    /// Static name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Connected { .. } => "Connected",
            Self::Stopping => "Stopping",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether a session object exists in this phase.
    pub fn has_session(&self) -> bool {
        !self.is_idle()
    }

    /// How long the session has been connected.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    /// Error for `operation` attempted in the current phase.
    pub fn reject(&self, operation: &'static str) -> LumenError {
        LumenError::InvalidState {
            operation,
            phase: self.name(),
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Starting`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_start(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Idle => {
                *self = Self::Starting;
                Ok(())
            }
            _ => Err(self.reject("start a connection")),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Starting`. Already `Connected` is accepted so the
    /// engine's `connection_started` and the start call's return can race.
    pub fn complete_start(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Starting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            Self::Connected { .. } => Ok(()),
            _ => Err(self.reject("complete connection start")),
        }
    }

    /// Transition to `Idle` after the engine refused to connect.
    ///
    /// Valid from: `Starting`, `Connected` (engine connected then returned failure).
    pub fn abort_start(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Starting | Self::Connected { .. } => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(self.reject("abort connection start")),
        }
    }

    /// Transition to `Stopping`.
    ///
    /// Valid from: `Connected`.
    pub fn begin_stop(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Stopping;
                Ok(())
            }
            _ => Err(self.reject("stop the connection")),
        }
    }

    /// Transition to `Idle`.
    ///
    /// Valid from: `Stopping`.
    pub fn finish_stop(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Stopping => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(self.reject("finish stopping")),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::Idle;

        phase.begin_start().unwrap();
        assert_eq!(phase, SessionPhase::Starting);

        phase.complete_start().unwrap();
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());

        phase.begin_stop().unwrap();
        assert_eq!(phase, SessionPhase::Stopping);

        phase.finish_stop().unwrap();
        assert!(phase.is_idle());
    }

    #[test]
    fn start_rejected_when_connected() {
        let mut phase = SessionPhase::Connected {
            since: Instant::now(),
        };
        let err = phase.begin_start().unwrap_err();
        assert!(matches!(
            err,
            LumenError::InvalidState {
                phase: "Connected",
                ..
            }
        ));
        assert!(phase.is_connected());
    }

    #[test]
    fn stop_rejected_when_idle() {
        let mut phase = SessionPhase::Idle;
        assert!(phase.begin_stop().is_err());
        assert!(phase.is_idle());
    }

    #[test]
    fn failed_start_returns_to_idle() {
        let mut phase = SessionPhase::Idle;
        phase.begin_start().unwrap();
        phase.abort_start().unwrap();
        assert!(phase.is_idle());
    }

    #[test]
    fn complete_start_is_idempotent() {
        let mut phase = SessionPhase::Starting;
        phase.complete_start().unwrap();
        phase.complete_start().unwrap();
        assert!(phase.is_connected());
    }

    #[test]
    fn stop_rejected_while_starting() {
        let mut phase = SessionPhase::Starting;
        assert!(phase.begin_stop().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Idle.to_string(), "Idle");
        assert_eq!(SessionPhase::Starting.to_string(), "Starting");
        assert_eq!(
            SessionPhase::Connected {
                since: Instant::now()
            }
            .to_string(),
            "Connected"
        );
        assert_eq!(SessionPhase::Stopping.to_string(), "Stopping");
    }

    #[test]
    fn default_phase_is_idle() {
        assert!(SessionPhase::default().is_idle());
        assert!(!SessionPhase::default().has_session());
    }
}
