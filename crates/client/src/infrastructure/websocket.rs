//! WebSocket transport using tokio-tungstenite
//!
//! Frames travel as JSON text messages. Scene loads go through [`HttpApi`]
//! against the same service.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, Message};

use persona_domain::AccessToken;
use persona_shared::{LoadSceneRequest, LoadSceneResponse, WireFrame};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::infrastructure::http::HttpApi;
use crate::ports::{DuplexStream, StreamHeaders, StreamReader, StreamWriter, Transport};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketTransport {
    stream_url: String,
    api: HttpApi,
    shut_down: AtomicBool,
}

impl WebSocketTransport {
    pub fn new(stream_url: impl Into<String>, api: HttpApi) -> Self {
        Self {
            stream_url: stream_url.into(),
            api,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.stream_url.clone(), HttpApi::from_config(config))
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::fault("transport is shut down"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn load_scene(
        &self,
        token: &AccessToken,
        request: LoadSceneRequest,
    ) -> Result<LoadSceneResponse, TransportError> {
        self.ensure_running()?;
        self.api.load_scene(token, &request).await
    }

    async fn open_stream(&self, headers: StreamHeaders) -> Result<DuplexStream, TransportError> {
        self.ensure_running()?;

        let mut request = self
            .stream_url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::fault(format!("invalid stream URL {}: {e}", self.stream_url)))?;

        for (name, value) in headers.pairs() {
            let header_value = tungstenite::http::HeaderValue::from_str(value)
                .map_err(|e| TransportError::fault(format!("invalid {name} header: {e}")))?;
            request.headers_mut().insert(name, header_value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::fault(format!("stream connect failed: {e}")))?;
        tracing::info!(url = %self.stream_url, "Connected session stream");

        let (sink, stream) = ws_stream.split();
        Ok(DuplexStream::new(
            WsReader { stream },
            WsWriter { sink },
        ))
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        tracing::debug!("WebSocket transport shut down");
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl StreamReader for WsReader {
    async fn read_next(&mut self) -> Result<Option<WireFrame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return WireFrame::from_json(&text)
                        .map(Some)
                        .map_err(TransportError::decode);
                }
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8(data)
                        .map_err(|e| TransportError::decode(format!("binary frame: {e}")))?;
                    return WireFrame::from_json(&text)
                        .map(Some)
                        .map_err(TransportError::decode);
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Server closed session stream");
                    return Ok(None);
                }
                // Pings are answered by tungstenite on the next write/flush
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::fault(e)),
            }
        }
    }

    async fn dispose(&mut self) {
        // Dropping the split stream releases the socket once the sink is gone too.
        tracing::debug!("Session stream reader disposed");
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl StreamWriter for WsWriter {
    async fn write(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        let json = frame
            .to_json()
            .map_err(|e| TransportError::fault(format!("failed to serialize frame: {e}")))?;
        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed => TransportError::Cancelled,
                other => TransportError::fault(other),
            })
    }

    async fn complete_send(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(TransportError::fault)?;
        self.sink.close().await.map_err(TransportError::fault)
    }
}
