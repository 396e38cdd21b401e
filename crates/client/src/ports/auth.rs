use async_trait::async_trait;

use persona_domain::AccessToken;

use crate::error::AuthError;

/// Exchanges a host-supplied session token for a bearer access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, session_token: &str) -> Result<AccessToken, AuthError>;
}
