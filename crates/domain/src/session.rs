//! Session lifecycle model.
//!
//! [`SessionState`] is the pure state machine the client engine drives; it
//! knows which transitions are legal but performs no I/O. [`SessionContext`]
//! holds the per-session values negotiated with the server.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::packet::StateChunk;

/// Lifecycle state of a session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Authenticating,
    Authenticated,
    SceneLoading,
    SceneLoaded,
    Streaming,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether the engine may move from `self` to `next`.
    ///
    /// Any state may fall back to `Idle` (destroy). `Closed` keeps the
    /// credentials, so it can load a new scene without re-authenticating.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Idle {
            return true;
        }

        matches!(
            (self, next),
            (Idle | Closed, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticated | SceneLoaded | Closed, SceneLoading)
                | (SceneLoading, SceneLoaded | Authenticated)
                | (SceneLoaded, Streaming)
                | (Streaming, Closing)
                | (Closing, Closed)
        )
    }

    /// Validated transition.
    pub fn transition(self, next: SessionState) -> Result<SessionState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_state_transition(self, next))
        }
    }

    /// True once credentials have been accepted and not yet discarded.
    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            Self::Authenticated
                | Self::SceneLoading
                | Self::SceneLoaded
                | Self::Streaming
                | Self::Closing
                | Self::Closed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::SceneLoading => "scene_loading",
            Self::SceneLoaded => "scene_loaded",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Server-issued key authorizing the streaming session.
///
/// The server returns a compound `{workspace}:{key}` value; only the segment
/// after the last colon identifies the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let key = raw.rsplit(':').next().unwrap_or(raw).trim();
        if key.is_empty() {
            return Err(DomainError::validation(format!(
                "session key is empty (raw value: {raw:?})"
            )));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values negotiated for the current (or most recent) session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    session_key: Option<SessionKey>,
    /// Base64 snapshot carried across sessions for continuation.
    last_state: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn is_session_initialized(&self) -> bool {
        self.session_key.is_some()
    }

    pub fn set_session_key(&mut self, key: SessionKey) {
        self.session_key = Some(key);
    }

    /// Drops the session key; the state snapshot is kept for the next session.
    pub fn clear_session(&mut self) {
        self.session_key = None;
    }

    pub fn last_state(&self) -> Option<&str> {
        self.last_state.as_deref()
    }

    /// Overwrites the snapshot with the newest chunk from the server.
    pub fn record_state(&mut self, chunk: &StateChunk) {
        self.last_state = Some(chunk.to_base64());
    }

    /// Restores a snapshot persisted by the host, validating its encoding.
    pub fn restore_state(&mut self, encoded: Option<String>) -> Result<(), DomainError> {
        if let Some(ref value) = encoded {
            StateChunk::from_base64(value)?;
        }
        self.last_state = encoded;
        Ok(())
    }
}
