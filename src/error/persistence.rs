// Persistence error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Persistence error code constants
///
/// Error code range: 5001-5004
pub struct PersistenceErrorCodes;

impl PersistenceErrorCodes {
    /// Transient failures persisted through every retry
    pub const RETRIES_EXHAUSTED: i32 = 5001;

    /// Sink permanently rejected the report
    pub const REJECTED: i32 = 5002;

    /// Owning session was cancelled while the save was in flight
    pub const CANCELLED: i32 = 5003;

    /// Local filesystem or serialization failure
    pub const IO: i32 = 5004;
}

/// Log a persistence error with structured context
pub fn log_persistence_error(err: &PersistenceError, context: &str) {
    error!(
        "Persistence error in {}: code={}, component=ReportStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Error returned by a single `ReportSink::insert` call
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// Worth retrying (network blip, busy backend, timeout)
    Transient(String),

    /// Retrying will not help (schema violation, authorization)
    Rejected(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Transient(reason) => write!(f, "transient sink failure: {}", reason),
            SinkError::Rejected(reason) => write!(f, "sink rejected report: {}", reason),
        }
    }
}

impl std::error::Error for SinkError {}

/// Errors surfaced by `ReportStore::save` once its retry policy is done
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// Every attempt failed transiently
    RetriesExhausted { attempts: u32, last_error: String },

    /// Sink rejected the report; not retried
    Rejected { reason: String },

    /// Session cancelled; the in-flight attempt was dropped
    Cancelled,

    /// Filesystem/serialization failure inside a local sink
    Io { details: String },
}

impl ErrorCode for PersistenceError {
    fn code(&self) -> i32 {
        match self {
            PersistenceError::RetriesExhausted { .. } => PersistenceErrorCodes::RETRIES_EXHAUSTED,
            PersistenceError::Rejected { .. } => PersistenceErrorCodes::REJECTED,
            PersistenceError::Cancelled => PersistenceErrorCodes::CANCELLED,
            PersistenceError::Io { .. } => PersistenceErrorCodes::IO,
        }
    }

    fn message(&self) -> String {
        match self {
            PersistenceError::RetriesExhausted {
                attempts,
                last_error,
            } => format!(
                "Report not saved after {} attempts: {}",
                attempts, last_error
            ),
            PersistenceError::Rejected { reason } => format!("Report rejected: {}", reason),
            PersistenceError::Cancelled => {
                "Session cancelled, report save dropped".to_string()
            }
            PersistenceError::Io { details } => format!("I/O error: {}", details),
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PersistenceError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PersistenceError {}

/// Convert from std::io::Error to PersistenceError
impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io {
            details: err.to_string(),
        }
    }
}
