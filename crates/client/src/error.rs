//! Error types for the client layers.

use persona_domain::{DomainError, SessionState};

use crate::connection::QueueKind;

/// Failures reported by a [`crate::ports::Transport`] or one of its stream halves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The stream was cancelled locally or by the peer. Not a failure.
    #[error("stream cancelled")]
    Cancelled,

    /// Network or protocol-level failure. Ends the current session.
    #[error("transport fault: {0}")]
    Fault(String),

    /// A single inbound frame could not be parsed. The stream stays usable.
    #[error("undecodable frame: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn fault(message: impl ToString) -> Self {
        Self::Fault(message.to_string())
    }

    pub fn decode(message: impl ToString) -> Self {
        Self::Decode(message.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("credentials rejected: {0}")]
    Rejected(String),
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
    #[error("access token expired")]
    Expired,
    #[error("not authenticated")]
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("{kind} queue is full (capacity {capacity})")]
    Full { kind: QueueKind, capacity: usize },
    #[error("{0} is not an incoming queue")]
    NotIncoming(QueueKind),
}

/// Errors returned to the host by [`crate::Client`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The operation is not valid in the current state. Nothing changed.
    #[error("cannot {operation} while {state}")]
    Precondition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("outgoing queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("scene load failed: {0}")]
    SceneLoad(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ClientError {
    pub fn precondition(operation: &'static str, state: SessionState) -> Self {
        Self::Precondition { operation, state }
    }

    pub fn scene_load(message: impl ToString) -> Self {
        Self::SceneLoad(message.to_string())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}

impl From<QueueError> for ClientError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full { capacity, .. } => Self::QueueFull { capacity },
            QueueError::NotIncoming(kind) => {
                Self::Domain(DomainError::validation(format!("{kind} is not an incoming queue")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message() {
        let err = ClientError::precondition("start a session", SessionState::Authenticated);
        assert_eq!(err.to_string(), "cannot start a session while authenticated");
        assert!(err.is_precondition());
    }

    #[test]
    fn test_queue_full_maps_to_client_error() {
        let err: ClientError = QueueError::Full {
            kind: QueueKind::Outgoing,
            capacity: 4,
        }
        .into();
        assert_eq!(err, ClientError::QueueFull { capacity: 4 });
    }
}
