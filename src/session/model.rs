// Session records
//
// Reading and Session are plain data. Only the state machine (in this module
// tree) can create or mutate a Session; everyone else sees it through shared
// references or clones.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calibration::CalibrationFactor;
use crate::error::SessionError;
use crate::session::SessionState;

/// Unique id of a measurement session; report sinks key writes on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One timestamped calibrated sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp_ms: u64,
    pub raw_level: f64,
    pub calibrated_db: f64,
}

/// One measurement run
///
/// Readings are strictly increasing in `timestamp_ms` and all lie within
/// `[started_at_ms, stopped_at_ms]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub(super) id: SessionId,
    pub(super) state: SessionState,
    pub(super) started_at_ms: u64,
    pub(super) stopped_at_ms: Option<u64>,
    pub(super) calibration_factor: CalibrationFactor,
    pub(super) readings: Vec<Reading>,
    pub(super) error: Option<SessionError>,
}

impl Session {
    pub(super) fn new(id: SessionId, started_at_ms: u64, factor: CalibrationFactor) -> Self {
        Self {
            id,
            state: SessionState::Active,
            started_at_ms,
            stopped_at_ms: None,
            calibration_factor: factor,
            readings: Vec::new(),
            error: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn stopped_at_ms(&self) -> Option<u64> {
        self.stopped_at_ms
    }

    /// `stopped_at - started_at` once the session has ended
    pub fn duration_ms(&self) -> Option<u64> {
        self.stopped_at_ms
            .map(|stopped| stopped.saturating_sub(self.started_at_ms))
    }

    pub fn calibration_factor(&self) -> CalibrationFactor {
        self.calibration_factor
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn latest_reading(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// Earliest timestamp the next reading may carry
    pub(super) fn next_allowed_timestamp(&self) -> Option<u64> {
        match self.readings.last() {
            Some(last) => last.timestamp_ms.checked_add(1),
            None => Some(self.started_at_ms),
        }
    }

    /// Close the reading window, never before the last reading
    pub(super) fn close(&mut self, state: SessionState, at_ms: u64) {
        let last = self
            .readings
            .last()
            .map(|r| r.timestamp_ms)
            .unwrap_or(self.started_at_ms);
        self.stopped_at_ms = Some(at_ms.max(last).max(self.started_at_ms));
        self.state = state;
    }
}
