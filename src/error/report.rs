// Report assembly error types and constants

use crate::error::ErrorCode;
use crate::session::SessionState;
use log::error;
use std::fmt;

/// Report error code constants
///
/// Error code range: 4001-4003
pub struct ReportErrorCodes;

impl ReportErrorCodes {
    /// Completed session carries no readings
    pub const EMPTY_SESSION: i32 = 4001;

    /// Session has not reached the completed state
    pub const SESSION_NOT_COMPLETED: i32 = 4002;

    /// Session state lock was poisoned while reading the session
    pub const STATE_POISONED: i32 = 4003;
}

/// Log a report error with structured context
pub fn log_report_error(err: &ReportError, context: &str) {
    error!(
        "Report error in {}: code={}, component=ReportAssembler, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Report assembly errors
///
/// `EmptySession` and `SessionNotCompleted` are programming-contract violations;
/// they are surfaced to the caller rather than producing an all-zero report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportError {
    /// Completed session with zero readings
    EmptySession,

    /// Only completed sessions produce reports
    SessionNotCompleted { state: SessionState },

    /// Session lock poisoned
    StatePoisoned,
}

impl ErrorCode for ReportError {
    fn code(&self) -> i32 {
        match self {
            ReportError::EmptySession => ReportErrorCodes::EMPTY_SESSION,
            ReportError::SessionNotCompleted { .. } => ReportErrorCodes::SESSION_NOT_COMPLETED,
            ReportError::StatePoisoned => ReportErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            ReportError::EmptySession => "Completed session has no readings".to_string(),
            ReportError::SessionNotCompleted { state } => {
                format!("Session is {}, only completed sessions produce reports", state)
            }
            ReportError::StatePoisoned => "Session state lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReportError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ReportError {}
