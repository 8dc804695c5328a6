// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Single source of truth for calibration error codes shared with the
/// presentation layer.
///
/// Error code range: 2001-2004
pub struct CalibrationErrorCodes;

impl CalibrationErrorCodes {
    /// Reference window shorter than the configured minimum
    pub const INSUFFICIENT_SAMPLES: i32 = 2001;

    /// Reference window is silent or contains non-finite samples
    pub const DEGENERATE_SIGNAL: i32 = 2002;

    /// Calibration factor is not a positive finite number
    pub const INVALID_FACTOR: i32 = 2003;

    /// Reuse of a previous factor requested but none exists
    pub const NOT_CALIBRATED: i32 = 2004;
}

/// Log a calibration error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// These errors cover deriving a calibration factor from a reference window
/// and reusing a previously derived factor.
///
/// Error code range: 2001-2004
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Reference window too short
    InsufficientSamples { required: usize, collected: usize },

    /// Baseline at or near zero, or the window contains NaN/infinite samples
    DegenerateSignal { reason: String },

    /// Factor outside (0, inf)
    InvalidFactor { value: f64 },

    /// No previous successful calibration to reuse
    NotCalibrated,}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InsufficientSamples { .. } => {
                CalibrationErrorCodes::INSUFFICIENT_SAMPLES
            }
            CalibrationError::DegenerateSignal { .. } => CalibrationErrorCodes::DEGENERATE_SIGNAL,
            CalibrationError::InvalidFactor { .. } => CalibrationErrorCodes::INVALID_FACTOR,
            CalibrationError::NotCalibrated => CalibrationErrorCodes::NOT_CALIBRATED,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InsufficientSamples {
                required,
                collected,
            } => {
                format!("Insufficient samples: need {}, got {}", required, collected)
            }
            CalibrationError::DegenerateSignal { reason } => {
                format!("Degenerate calibration signal: {}", reason)
            }
            CalibrationError::InvalidFactor { value } => {
                format!("Invalid calibration factor: {}", value)
            }
            CalibrationError::NotCalibrated => {
                "No previous calibration available to reuse".to_string()
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_codes() {
        assert_eq!(
            CalibrationError::InsufficientSamples {
                required: 8,
                collected: 3
            }
            .code(),
            CalibrationErrorCodes::INSUFFICIENT_SAMPLES
        );
        assert_eq!(
            CalibrationError::DegenerateSignal {
                reason: "silence".to_string()
            }
            .code(),
            CalibrationErrorCodes::DEGENERATE_SIGNAL
        );
        assert_eq!(
            CalibrationError::InvalidFactor { value: -1.0 }.code(),
            CalibrationErrorCodes::INVALID_FACTOR
        );
        assert_eq!(
            CalibrationError::NotCalibrated.code(),
            CalibrationErrorCodes::NOT_CALIBRATED
        );
    }

    #[test]
    fn test_calibration_error_messages() {
        let err = CalibrationError::InsufficientSamples {
            required: 8,
            collected: 3,
        };
        assert_eq!(err.message(), "Insufficient samples: need 8, got 3");

        let err = CalibrationError::DegenerateSignal {
            reason: "baseline 0".to_string(),
        };
        assert_eq!(err.message(), "Degenerate calibration signal: baseline 0");

        let err = CalibrationError::NotCalibrated;
        assert!(err.message().contains("No previous calibration"));
    }

    #[test]
    fn test_calibration_error_display() {
        let err = CalibrationError::NotCalibrated;
        let display = format!("{}", err);
        assert!(display.contains("CalibrationError"));
        assert!(display.contains(&err.code().to_string()));
    }
}
