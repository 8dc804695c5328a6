use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the measurement context
///
/// ```text
/// Idle -> Starting -> Active -> Stopping -> Completed
///            |          |
///            |          +-----> Error | Cancelled
///            +----------------> Error | Cancelled
/// ```
///
/// Terminal states (`Completed`, `Cancelled`, `Error`) need an explicit reset
/// before the next session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Completed,
    Cancelled,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Error
        )
    }

    /// Starting, active or stopping
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Active | SessionState::Stopping
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Error.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(SessionState::Starting.is_in_progress());
        assert!(!SessionState::Idle.is_in_progress());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(SessionState::Error.to_string(), "error");
    }
}
