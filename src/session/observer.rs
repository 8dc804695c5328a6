// SessionSnapshot - what presentation layers see of the session
//
// Snapshots are published on every transition and every recorded tick through
// a tokio broadcast channel, and can also be polled. Slow subscribers lag and
// skip snapshots rather than applying backpressure to the session.

use serde::{Deserialize, Serialize};

use crate::error::ErrorSummary;
use crate::session::{SessionId, SessionState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    /// `now - started_at` while active; fixed span once the session ended
    pub measurement_duration_ms: u64,
    pub latest_db: Option<f64>,
    pub reading_count: usize,
    /// Frames dropped by the queue plus out-of-order ticks
    pub missed_samples: u64,
    pub error: Option<ErrorSummary>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            measurement_duration_ms: 0,
            latest_db: None,
            reading_count: 0,
            missed_samples: 0,
            error: None,
        }
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
