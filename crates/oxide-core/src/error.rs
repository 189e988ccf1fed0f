//! Error types for Oxide CI.

use crate::status::Status;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Entity lookups
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Build not found: {0}")]
    BuildNotFound(String),

    #[error("Stage not found: {0}")]
    StageNotFound(String),

    // Configuration errors
    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // State machine errors
    #[error("Cannot {action} a Pipeline with Status \"{status}\"")]
    InvalidTransition { action: &'static str, status: Status },

    #[error("Cannot {action} a Build with Status \"{status}\"")]
    InvalidBuildTransition { action: &'static str, status: Status },

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            action: "approve",
            status: Status::Running,
        };
        assert_eq!(
            err.to_string(),
            "Cannot approve a Pipeline with Status \"running\""
        );
    }
}
