// Noise Meter Core - civic noise measurement sessions
// Calibration, decibel sampling, session lifecycle, reporting and persistence

// Module declarations
pub mod audio;
pub mod calibration;
pub mod config;
pub mod context;
pub mod error;
pub mod report;
pub mod session;
pub mod store;
pub mod telemetry;

// Re-exports for convenience
pub use calibration::{CalibrationEngine, CalibrationFactor};
pub use config::AppConfig;
pub use context::{MeasurementContext, PumpStatus, SessionEnd};
pub use error::{
    CalibrationError, ErrorCode, PersistenceError, ReportError, SessionError, SinkError,
};
pub use report::{NoiseBand, Report, ReportAssembler, Trend, Verdict};
pub use session::{
    CalibrationInput, Reading, Session, SessionId, SessionSnapshot, SessionState,
    SessionStateMachine, SessionToken, StartRequest, TickOutcome,
};
pub use store::{DirectoryReportSink, MemoryReportSink, ReportSink, ReportStore, SinkAck};
