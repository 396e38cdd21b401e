use async_trait::async_trait;

use persona_domain::{AccessToken, SessionKey};
use persona_shared::{LoadSceneRequest, LoadSceneResponse, WireFrame};

use crate::error::TransportError;

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const SESSION_ID_HEADER: &str = "session-id";

/// Metadata attached when opening the session stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeaders {
    pub authorization: String,
    pub session_id: String,
}

impl StreamHeaders {
    pub fn new(token: &AccessToken, session_key: &SessionKey) -> Self {
        Self {
            authorization: token.bearer(),
            session_id: session_key.to_string(),
        }
    }

    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [
            (AUTHORIZATION_HEADER, self.authorization.as_str()),
            (SESSION_ID_HEADER, self.session_id.as_str()),
        ]
    }
}

/// Read half of an open session stream.
#[async_trait]
pub trait StreamReader: Send {
    /// Next inbound frame. `Ok(None)` means the peer ended the stream.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn read_next(&mut self) -> Result<Option<WireFrame>, TransportError>;

    /// Releases the underlying stream resources.
    async fn dispose(&mut self);
}

/// Write half of an open session stream.
#[async_trait]
pub trait StreamWriter: Send {
    async fn write(&mut self, frame: WireFrame) -> Result<(), TransportError>;

    /// Tells the peer no more frames will be sent.
    async fn complete_send(&mut self) -> Result<(), TransportError>;
}

pub struct DuplexStream {
    pub reader: Box<dyn StreamReader>,
    pub writer: Box<dyn StreamWriter>,
}

impl DuplexStream {
    pub fn new(reader: impl StreamReader + 'static, writer: impl StreamWriter + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// Connection to the character service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Unary scene-load call made before the stream opens.
    async fn load_scene(
        &self,
        token: &AccessToken,
        request: LoadSceneRequest,
    ) -> Result<LoadSceneResponse, TransportError>;

    async fn open_stream(&self, headers: StreamHeaders) -> Result<DuplexStream, TransportError>;

    /// Releases transport-wide resources. Further calls fail.
    async fn shutdown(&self);
}
