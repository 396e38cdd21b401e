//! Runtime notifications pushed to the host.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    InitSuccess,
    InitFailed,
    LoadSceneComplete,
    LoadSceneFailed,
    SessionStarted,
    SessionClosed,
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitSuccess => write!(f, "init_success"),
            Self::InitFailed => write!(f, "init_failed"),
            Self::LoadSceneComplete => write!(f, "load_scene_complete"),
            Self::LoadSceneFailed => write!(f, "load_scene_failed"),
            Self::SessionStarted => write!(f, "session_started"),
            Self::SessionClosed => write!(f, "session_closed"),
        }
    }
}

/// `(status, message)` pair emitted on the notification channel.
///
/// `message` is empty for successful transitions and carries the failure
/// reason otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub status: RuntimeStatus,
    pub message: String,
}

impl RuntimeEvent {
    pub fn new(status: RuntimeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn ok(status: RuntimeStatus) -> Self {
        Self::new(status, "")
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            RuntimeStatus::InitFailed | RuntimeStatus::LoadSceneFailed
        ) || (self.status == RuntimeStatus::SessionClosed && !self.message.is_empty())
    }
}
