//! Metric events describing session lifecycle and persistence activity.

use serde::{Deserialize, Serialize};

use crate::session::{SessionId, SessionState};

/// Outcome of a single report insert attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Acknowledged,
    Transient,
    TimedOut,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    StateChanged {
        session_id: Option<SessionId>,
        from: SessionState,
        to: SessionState,
        at_ms: u64,
    },
    MissedSamples {
        session_id: Option<SessionId>,
        dropped: u64,
        total: u64,
    },
    PersistenceAttempt {
        session_id: SessionId,
        attempt: u32,
        outcome: AttemptOutcome,
    },
    Error {
        code: i32,
        context: String,
    },
}
