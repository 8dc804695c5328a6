// Error types for the noise measurement core
//
// This module defines one error enum per domain (calibration, session lifecycle,
// report assembly, persistence). Every error carries a stable numeric code so the
// host application can map failures to UI state without string matching.

mod calibration;
mod persistence;
mod report;
mod session;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use persistence::{
    log_persistence_error, PersistenceError, PersistenceErrorCodes, SinkError,
};
pub use report::{log_report_error, ReportError, ReportErrorCodes};
pub use session::{log_session_error, SessionError, SessionErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the boundary to the presentation layer.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Serializable summary of any [`ErrorCode`] error, used by session snapshots
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorSummary {
    pub code: i32,
    pub message: String,
}

impl ErrorSummary {
    pub fn from_error(err: &dyn ErrorCode) -> Self {
        Self {
            code: err.code(),
            message: err.message(),
        }
    }
}
