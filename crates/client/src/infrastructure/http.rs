//! HTTP client for the unary service calls (token exchange, scene load).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use persona_domain::AccessToken;
use persona_shared::{GenerateTokenRequest, GenerateTokenResponse, LoadSceneRequest, LoadSceneResponse};

use crate::config::ClientConfig;
use crate::error::{AuthError, TransportError};
use crate::ports::AuthProvider;

pub const TOKEN_PATH: &str = "/v1/auth/token";
pub const LOAD_SCENE_PATH: &str = "/v1/scenes:load";

#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.server_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn generate_token(&self, session_token: &str) -> Result<AccessToken, AuthError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let response = self
            .client
            .post(&url)
            .json(&GenerateTokenRequest {
                session_token: session_token.to_string(),
            })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Unavailable(format!("{status}: {body}")));
        }

        let token: GenerateTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("invalid token response: {e}")))?;
        Ok(token.into())
    }

    pub async fn load_scene(
        &self,
        token: &AccessToken,
        request: &LoadSceneRequest,
    ) -> Result<LoadSceneResponse, TransportError> {
        let url = format!("{}{}", self.base_url, LOAD_SCENE_PATH);
        tracing::debug!(url = %url, scene = %request.scene, "Sending scene load request");

        let mut builder = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .json(request);
        if let Some(session_id) = &token.session_id {
            builder = builder.header("session-id", session_id);
        }

        let response = builder.send().await.map_err(TransportError::fault)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Fault(format!(
                "scene load returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::fault(format!("invalid scene load response: {e}")))
    }
}

/// [`AuthProvider`] backed by the service's token endpoint.
#[derive(Clone)]
pub struct HttpAuthProvider {
    api: HttpApi,
}

impl HttpAuthProvider {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(HttpApi::from_config(config))
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn authenticate(&self, session_token: &str) -> Result<AccessToken, AuthError> {
        tracing::debug!(base_url = %self.api.base_url(), "Requesting access token");
        self.api.generate_token(session_token).await
    }
}
