//! Token exchange contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use persona_domain::AccessToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTokenRequest {
    pub session_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTokenResponse {
    pub token: String,
    pub expiration_time: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl From<GenerateTokenResponse> for AccessToken {
    fn from(response: GenerateTokenResponse) -> Self {
        AccessToken {
            token: response.token,
            expires_at: response.expiration_time,
            session_id: response.session_id.filter(|id| !id.is_empty()),
        }
    }
}
