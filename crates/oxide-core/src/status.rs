//! Execution status shared by builds, stages, and steps.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting on upstream stages before it may be scheduled.
    #[default]
    Waiting,
    Pending,
    /// Held for manual approval.
    Blocked,
    Declined,
    Running,
    #[serde(rename = "success")]
    Passing,
    #[serde(rename = "failure")]
    Failing,
    Killed,
    Error,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Waiting => "waiting",
            Status::Pending => "pending",
            Status::Blocked => "blocked",
            Status::Declined => "declined",
            Status::Running => "running",
            Status::Passing => "success",
            Status::Failing => "failure",
            Status::Killed => "killed",
            Status::Error => "error",
            Status::Skipped => "skipped",
        }
    }

    /// No further transitions happen without external intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Passing
                | Status::Failing
                | Status::Killed
                | Status::Error
                | Status::Skipped
                | Status::Declined
        )
    }

    /// Terminal statuses a stage may be restarted from. Declined is
    /// terminal but can only be left through a new build.
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            Status::Passing | Status::Failing | Status::Killed | Status::Error | Status::Skipped
        )
    }

    /// Build statuses that reject any stage restart up front.
    pub fn is_gated(&self) -> bool {
        matches!(self, Status::Blocked | Status::Declined)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&Status::Passing).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&Status::Failing).unwrap(), "\"failure\"");
        assert_eq!(serde_json::to_string(&Status::Waiting).unwrap(), "\"waiting\"");

        let parsed: Status = serde_json::from_str("\"killed\"").unwrap();
        assert_eq!(parsed, Status::Killed);
    }

    #[test]
    fn test_display_matches_serde() {
        for status in [
            Status::Waiting,
            Status::Pending,
            Status::Blocked,
            Status::Declined,
            Status::Running,
            Status::Passing,
            Status::Failing,
            Status::Killed,
            Status::Error,
            Status::Skipped,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json.trim_matches('"'), status.to_string());
        }
    }

    #[test]
    fn test_restartable_statuses() {
        assert!(Status::Passing.is_restartable());
        assert!(Status::Failing.is_restartable());
        assert!(Status::Killed.is_restartable());
        assert!(Status::Error.is_restartable());
        assert!(Status::Skipped.is_restartable());

        assert!(!Status::Pending.is_restartable());
        assert!(!Status::Running.is_restartable());
        assert!(!Status::Waiting.is_restartable());
        assert!(!Status::Blocked.is_restartable());
        assert!(!Status::Declined.is_restartable());
    }

    #[test]
    fn test_gated_build_statuses() {
        assert!(Status::Blocked.is_gated());
        assert!(Status::Declined.is_gated());
        for status in [Status::Pending, Status::Running, Status::Failing, Status::Passing] {
            assert!(!status.is_gated(), "{} is not gated", status);
        }
    }

    #[test]
    fn test_declined_is_terminal_but_not_restartable() {
        assert!(Status::Declined.is_terminal());
        assert!(!Status::Declined.is_restartable());
    }
}
