//! Error types for automation execution.
//!
//! Admission failures (already running, at capacity) are rejections, not
//! faults: the caller gets them back immediately and nothing was started.
//! Everything else is captured into the run's history record.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    // Admission rejections
    #[error("Automation '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Concurrency limit reached ({running}/{max} running)")]
    LimitReached { running: usize, max: usize },

    // Execution failures
    #[error("Automation '{0}' not found")]
    NotFound(String),

    #[error("Automation was cancelled")]
    Cancelled,

    #[error("Command failed with exit code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Db(String),
}

impl AutomationError {
    /// True for admission rejections: the run never started and no history
    /// record was written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AutomationError::AlreadyRunning(_) | AutomationError::LimitReached { .. }
        )
    }
}

impl From<std::io::Error> for AutomationError {
    fn from(err: std::io::Error) -> Self {
        AutomationError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_flagged() {
        assert!(AutomationError::AlreadyRunning("a1".to_string()).is_rejection());
        assert!(AutomationError::LimitReached { running: 2, max: 2 }.is_rejection());
        assert!(!AutomationError::Cancelled.is_rejection());
        assert!(!AutomationError::Io("boom".to_string()).is_rejection());
    }
}
