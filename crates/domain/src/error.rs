//! Unified error types for the domain layer
//!
//! Provides a common error type for packet and session-model operations, so adapters
//! never have to fall back to `String` or `anyhow` for domain failures.

use thiserror::Error;

use crate::session::SessionState;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed (e.g., empty session key)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Parse error (for value objects such as state snapshots)
    #[error("Parse error: {0}")]
    Parse(String),

    /// State transition not allowed
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: SessionState, to: SessionState },
}

impl DomainError {
    /// Creates a validation error for violated value-object invariants.
    ///
    /// # Example
    /// ```ignore
    /// if key.is_empty() {
    ///     return Err(DomainError::validation("session key cannot be empty"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(from: SessionState, to: SessionState) -> Self {
        Self::InvalidStateTransition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("session key cannot be empty");
        assert_eq!(
            err.to_string(),
            "Validation failed: session key cannot be empty"
        );
    }

    #[test]
    fn test_invalid_state_transition_error() {
        let err =
            DomainError::invalid_state_transition(SessionState::Idle, SessionState::Streaming);
        assert_eq!(err.to_string(), "Invalid state transition: idle -> streaming");
    }
}
