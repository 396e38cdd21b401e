//! Access token issued by the external auth collaborator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token plus its expiry. Acquisition and refresh happen outside the client.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Server-side session id some deployments attach to the token.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
            session_id: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Expired, or expiring within `margin`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.is_expired_at(now + margin)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Never print the token itself.
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("session_id", &self.session_id)
            .finish()
    }
}
