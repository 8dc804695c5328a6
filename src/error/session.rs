// Session lifecycle error types and constants

use crate::error::{CalibrationError, ErrorCode};
use crate::session::SessionState;
use log::error;
use std::fmt;

/// Session error code constants
///
/// Error code range: 3001-3006
pub struct SessionErrorCodes;

impl SessionErrorCodes {
    /// A session is already in progress (or awaiting reset)
    pub const SESSION_ALREADY_ACTIVE: i32 = 3001;

    /// Requested operation is not valid from the current state
    pub const INVALID_TRANSITION: i32 = 3002;

    /// Tick timestamp does not advance the reading sequence
    pub const OUT_OF_ORDER_TICK: i32 = 3003;

    /// Calibration failed while starting the session
    pub const CALIBRATION_FAILED: i32 = 3004;

    /// Audio source reported a failure
    pub const SOURCE_FAILED: i32 = 3005;

    /// Session state lock was poisoned
    pub const STATE_POISONED: i32 = 3006;
}

/// Log a session error with structured context
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=SessionStateMachine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Session lifecycle errors
///
/// `SessionAlreadyActive`, `InvalidTransition` and `OutOfOrderTick` are caller
/// contract violations and are never retried. `Calibration` and `SourceFailed`
/// are also recorded on the session and move it into the error state.
///
/// Error code range: 3001-3006
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// `start` called while the machine is not idle
    SessionAlreadyActive { state: SessionState },

    /// Operation not permitted from the current state
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    /// Tick timestamp not strictly after the previous reading
    OutOfOrderTick { previous_ms: u64, received_ms: u64 },

    /// Calibration failed during start
    Calibration(CalibrationError),

    /// Audio source failed mid-session
    SourceFailed { reason: String },

    /// Session state lock was poisoned
    StatePoisoned,
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::SessionAlreadyActive { .. } => SessionErrorCodes::SESSION_ALREADY_ACTIVE,
            SessionError::InvalidTransition { .. } => SessionErrorCodes::INVALID_TRANSITION,
            SessionError::OutOfOrderTick { .. } => SessionErrorCodes::OUT_OF_ORDER_TICK,
            SessionError::Calibration(_) => SessionErrorCodes::CALIBRATION_FAILED,
            SessionError::SourceFailed { .. } => SessionErrorCodes::SOURCE_FAILED,
            SessionError::StatePoisoned => SessionErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::SessionAlreadyActive { state } => format!(
                "Session already active (state: {}). Stop, cancel or reset first.",
                state
            ),
            SessionError::InvalidTransition { from, action } => {
                format!("Cannot {} from state {}", action, from)
            }
            SessionError::OutOfOrderTick {
                previous_ms,
                received_ms,
            } => format!(
                "Tick at {} ms does not advance past {} ms",
                received_ms, previous_ms
            ),
            SessionError::Calibration(err) => format!("Calibration failed: {}", err.message()),
            SessionError::SourceFailed { reason } => format!("Audio source failed: {}", reason),
            SessionError::StatePoisoned => "Session state lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Calibration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CalibrationError> for SessionError {
    fn from(err: CalibrationError) -> Self {
        SessionError::Calibration(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(
            SessionError::SessionAlreadyActive {
                state: SessionState::Active
            }
            .code(),
            3001
        );
        assert_eq!(
            SessionError::InvalidTransition {
                from: SessionState::Idle,
                action: "stop"
            }
            .code(),
            3002
        );
        assert_eq!(
            SessionError::OutOfOrderTick {
                previous_ms: 10,
                received_ms: 5
            }
            .code(),
            3003
        );
        assert_eq!(
            SessionError::Calibration(CalibrationError::NotCalibrated).code(),
            3004
        );
        assert_eq!(
            SessionError::SourceFailed {
                reason: "gone".to_string()
            }
            .code(),
            3005
        );
        assert_eq!(SessionError::StatePoisoned.code(), 3006);
    }

    #[test]
    fn test_session_error_messages() {
        let err = SessionError::InvalidTransition {
            from: SessionState::Idle,
            action: "stop",
        };
        assert_eq!(err.message(), "Cannot stop from state idle");

        let err = SessionError::SessionAlreadyActive {
            state: SessionState::Active,
        };
        assert!(err.message().contains("already active"));
    }

    #[test]
    fn test_calibration_error_conversion() {
        let err: SessionError = CalibrationError::NotCalibrated.into();
        assert!(matches!(
            err,
            SessionError::Calibration(CalibrationError::NotCalibrated)
        ));
        assert!(std::error::Error::source(&err).is_some());
    }
}
