//! Custom error types for Promethean.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the orchestrator.

use thiserror::Error;

use crate::provider::ErrorKind;

/// Main error type for Promethean operations
#[derive(Error, Debug)]
pub enum PrometheanError {
    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Session is in the wrong state for the requested operation
    #[error("Invalid session state: {message}")]
    InvalidState { message: String },

    /// A development loop is already bound to this session
    #[error("Session '{session_id}' already has a running development cycle")]
    CycleAlreadyRunning { session_id: String },

    /// Development cannot start without a project plan
    #[error("No project plan derived for session '{session_id}'")]
    MissingPlan { session_id: String },

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// Both architects are unusable
    #[error("Both architects failed; last error ({kind}): {message}")]
    BothArchitectsFailed { kind: ErrorKind, message: String },

    // =========================================================================
    // Loop Execution Errors
    // =========================================================================
    /// The cycle detected it is stuck (repetition or repeated failures)
    #[error("Development cycle stuck: {reason}")]
    Stuck { reason: String },

    /// Failsafe ceiling on total cycles reached
    #[error("Maximum cycles ({max}) exceeded without completion")]
    MaxCycles { max: u32 },

    // =========================================================================
    // Checkpoint Errors
    // =========================================================================
    /// Checkpoint missing or unreadable
    #[error("Checkpoint error for session '{session_id}': {message}")]
    Checkpoint { session_id: String, message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PrometheanError {
    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is fatal (should terminate the loop)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Stuck { .. }
                | Self::MaxCycles { .. }
                | Self::BothArchitectsFailed { .. }
                | Self::CycleAlreadyRunning { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Stuck { .. } => 3,
            Self::MaxCycles { .. } => 4,
            Self::BothArchitectsFailed { .. } => 5,
            Self::CycleAlreadyRunning { .. } => 6,
            Self::MissingPlan { .. } | Self::InvalidState { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for Promethean results
pub type Result<T> = std::result::Result<T, PrometheanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrometheanError::MaxCycles { max: 100 };
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(PrometheanError::Stuck {
            reason: "repetition".into()
        }
        .is_fatal());
        assert!(PrometheanError::MaxCycles { max: 100 }.is_fatal());
        assert!(!PrometheanError::invalid_state("test").is_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            PrometheanError::Stuck {
                reason: "x".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(PrometheanError::MaxCycles { max: 10 }.exit_code(), 4);
        assert_eq!(
            PrometheanError::MissingPlan {
                session_id: "s".into()
            }
            .exit_code(),
            7
        );
    }

    #[test]
    fn test_checkpoint_helper() {
        let err = PrometheanError::checkpoint("abc-123", "no checkpoint on disk");
        assert!(err.to_string().contains("abc-123"));
        assert!(err.to_string().contains("no checkpoint on disk"));
        assert!(!err.is_fatal());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: PrometheanError = io_err.into();
        assert!(matches!(err, PrometheanError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
