mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use persona_client::infrastructure::{MemoryAuthProvider, StaticSceneConfig};
use persona_client::ports::{DuplexStream, StreamHeaders, StreamReader, StreamWriter, Transport};
use persona_client::{Client, ClientConfig, ClientError, TransportError};
use persona_domain::{AccessToken, Packet, RuntimeStatus, SessionState};
use persona_shared::{LoadSceneRequest, LoadSceneResponse, WireFrame};

use common::{demo_scene, eventually, next_event, WAIT};

/// Server side of [`GatedTransport`]: gates and observations.
#[derive(Default)]
struct Gates {
    hold_open: bool,
    /// Writes after this many hang until cancelled.
    writes_before_stall: Option<usize>,
    open_entered: Notify,
    open_release: Notify,
    streams_opened: AtomicUsize,
    streams_disposed: AtomicUsize,
    writes: Mutex<Vec<String>>,
}

impl Gates {
    fn written(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

struct GatedTransport {
    gates: Arc<Gates>,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn load_scene(
        &self,
        _token: &AccessToken,
        _request: LoadSceneRequest,
    ) -> Result<LoadSceneResponse, TransportError> {
        Ok(demo_scene())
    }

    async fn open_stream(&self, _headers: StreamHeaders) -> Result<DuplexStream, TransportError> {
        if self.gates.hold_open {
            self.gates.open_entered.notify_one();
            self.gates.open_release.notified().await;
        }
        self.gates.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(DuplexStream::new(
            SilentReader {
                gates: Arc::clone(&self.gates),
            },
            GatedWriter {
                gates: Arc::clone(&self.gates),
            },
        ))
    }

    async fn shutdown(&self) {}
}

struct SilentReader {
    gates: Arc<Gates>,
}

#[async_trait]
impl StreamReader for SilentReader {
    async fn read_next(&mut self) -> Result<Option<WireFrame>, TransportError> {
        std::future::pending().await
    }

    async fn dispose(&mut self) {
        self.gates.streams_disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct GatedWriter {
    gates: Arc<Gates>,
}

#[async_trait]
impl StreamWriter for GatedWriter {
    async fn write(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        let text = frame
            .into_packet()
            .ok()
            .and_then(|p: Packet| p.as_text().map(|t| t.text.clone()))
            .unwrap_or_default();
        let count = {
            let mut writes = self.gates.writes.lock().unwrap_or_else(|p| p.into_inner());
            writes.push(text);
            writes.len()
        };
        if self.gates.writes_before_stall.is_some_and(|limit| count > limit) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn complete_send(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

async fn loaded_client(gates: Arc<Gates>, config: ClientConfig) -> Client {
    let client = Client::new(
        config,
        Arc::new(MemoryAuthProvider::new()),
        Arc::new(StaticSceneConfig::default()),
        Arc::new(GatedTransport { gates }),
    );
    client.authenticate("session-token").await.unwrap();
    client.load_scene("demo").await.unwrap();
    client
}

fn start_in_background(client: &Client) -> tokio::task::JoinHandle<Result<(), ClientError>> {
    let client = client.clone();
    tokio::spawn(async move { client.start_session().await })
}

#[tokio::test]
async fn test_end_session_while_stream_is_opening() {
    let gates = Arc::new(Gates {
        hold_open: true,
        ..Gates::default()
    });
    let client = loaded_client(Arc::clone(&gates), ClientConfig::default()).await;
    let mut rx = client.subscribe();

    let starting = start_in_background(&client);
    tokio::time::timeout(WAIT, gates.open_entered.notified())
        .await
        .unwrap();
    assert!(!client.session_started());

    client.end_session().await;
    assert_eq!(client.state(), SessionState::Closed);
    let closed = next_event(&mut rx, RuntimeStatus::SessionClosed).await;
    assert_eq!(closed.message, "");

    gates.open_release.notify_one();
    let result = tokio::time::timeout(WAIT, starting).await.unwrap().unwrap();

    assert_eq!(result, Err(ClientError::Transport(TransportError::Cancelled)));
    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.session_started());
    assert!(client.queue_stats().is_none());
    assert_eq!(gates.streams_opened.load(Ordering::SeqCst), 0);
    assert!(client.take_errors().is_empty());
    assert_eq!(client.metrics().sessions_started, 0);
}

#[tokio::test]
async fn test_destroy_while_stream_is_opening() {
    let gates = Arc::new(Gates {
        hold_open: true,
        ..Gates::default()
    });
    let client = loaded_client(Arc::clone(&gates), ClientConfig::default()).await;

    let starting = start_in_background(&client);
    tokio::time::timeout(WAIT, gates.open_entered.notified())
        .await
        .unwrap();

    client.destroy().await;
    gates.open_release.notify_one();
    let result = tokio::time::timeout(WAIT, starting).await.unwrap().unwrap();

    assert!(result.is_err());
    assert_eq!(client.state(), SessionState::Idle);
    assert!(!client.session_started());
    assert!(client.queue_stats().is_none());
    assert_eq!(gates.streams_opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_mid_batch_abandons_remaining_writes() {
    let gates = Arc::new(Gates {
        writes_before_stall: Some(1),
        ..Gates::default()
    });
    let config = ClientConfig {
        send_interval: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    let client = loaded_client(Arc::clone(&gates), config).await;
    client.start_session().await.unwrap();

    // Queued before the first coalescing tick, so they drain as one batch.
    for text in ["one", "two", "three"] {
        client.send_text("agent-1", text).unwrap();
    }
    eventually(|| (gates.written().len() == 2).then_some(())).await;

    client.end_session().await;

    assert_eq!(gates.written(), vec!["one", "two"]);
    assert_eq!(client.metrics().frames_sent, 1);
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.take_errors().is_empty());
    assert_eq!(gates.streams_disposed.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(gates.written().len(), 2, "nothing is written after the session ends");
}
