//! In-process loopback adapters
//!
//! [`MemoryTransport`] plays the server side of a session without a network:
//! a [`MemoryPeer`] handle scripts scene-load answers, pushes inbound frames
//! or faults into the open stream, and observes what the client sent.
//! [`MemoryAuthProvider`] issues tokens locally. Together they let a host run
//! the full lifecycle offline and are what the engine tests drive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Notify};

use persona_domain::{AccessToken, AgentId, Packet};
use persona_shared::{AgentInfo, LoadSceneRequest, LoadSceneResponse, WireFrame};

use crate::error::{AuthError, TransportError};
use crate::ports::{
    AuthProvider, DuplexStream, StreamHeaders, StreamReader, StreamWriter, Transport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Inbound {
    Frame(WireFrame),
    Raw(String),
    Fault(String),
    Cancel,
    End,
}

struct OpenStream {
    id: usize,
    tx: mpsc::UnboundedSender<Inbound>,
}

#[derive(Default)]
struct MemoryShared {
    scene_responses: Mutex<VecDeque<Result<LoadSceneResponse, TransportError>>>,
    scene_requests: Mutex<Vec<LoadSceneRequest>>,
    open_failures: Mutex<VecDeque<TransportError>>,
    stream: Mutex<Option<OpenStream>>,
    headers: Mutex<Vec<StreamHeaders>>,
    sent: Mutex<Vec<WireFrame>>,
    sent_notify: Notify,
    write_fault: Mutex<Option<String>>,
    streams_opened: AtomicUsize,
    sends_completed: AtomicUsize,
    streams_disposed: AtomicUsize,
    shut_down: AtomicBool,
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<MemoryShared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for driving the server side.
    pub fn peer(&self) -> MemoryPeer {
        MemoryPeer {
            shared: Arc::clone(&self.shared),
        }
    }

    fn default_scene_response(scene: &str) -> LoadSceneResponse {
        LoadSceneResponse {
            key: format!("memory:{scene}"),
            agents: vec![AgentInfo {
                agent_id: AgentId::from("memory-agent"),
                brain_name: format!("{scene}/characters/narrator"),
                given_name: "Narrator".to_string(),
            }],
            previous_state: None,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn load_scene(
        &self,
        _token: &AccessToken,
        request: LoadSceneRequest,
    ) -> Result<LoadSceneResponse, TransportError> {
        if self.shared.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::fault("transport is shut down"));
        }
        let scene = request.scene.clone();
        lock(&self.shared.scene_requests).push(request);

        lock(&self.shared.scene_responses)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_scene_response(&scene)))
    }

    async fn open_stream(&self, headers: StreamHeaders) -> Result<DuplexStream, TransportError> {
        if self.shared.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::fault("transport is shut down"));
        }
        if let Some(err) = lock(&self.shared.open_failures).pop_front() {
            return Err(err);
        }

        let id = self.shared.streams_opened.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.shared.stream) = Some(OpenStream { id, tx });
        lock(&self.shared.headers).push(headers);
        tracing::debug!(stream = id, "Memory stream opened");

        Ok(DuplexStream::new(
            MemoryReader {
                id,
                rx,
                shared: Arc::clone(&self.shared),
            },
            MemoryWriter {
                shared: Arc::clone(&self.shared),
            },
        ))
    }

    async fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::SeqCst);
        *lock(&self.shared.stream) = None;
    }
}

struct MemoryReader {
    id: usize,
    rx: mpsc::UnboundedReceiver<Inbound>,
    shared: Arc<MemoryShared>,
}

#[async_trait]
impl StreamReader for MemoryReader {
    async fn read_next(&mut self) -> Result<Option<WireFrame>, TransportError> {
        match self.rx.recv().await {
            None | Some(Inbound::End) => Ok(None),
            Some(Inbound::Frame(frame)) => Ok(Some(frame)),
            Some(Inbound::Raw(text)) => WireFrame::from_json(&text)
                .map(Some)
                .map_err(TransportError::decode),
            Some(Inbound::Fault(message)) => Err(TransportError::Fault(message)),
            Some(Inbound::Cancel) => Err(TransportError::Cancelled),
        }
    }

    async fn dispose(&mut self) {
        self.rx.close();
        let mut stream = lock(&self.shared.stream);
        if stream.as_ref().is_some_and(|open| open.id == self.id) {
            *stream = None;
        }
        self.shared.streams_disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryWriter {
    shared: Arc<MemoryShared>,
}

#[async_trait]
impl StreamWriter for MemoryWriter {
    async fn write(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        if let Some(message) = lock(&self.shared.write_fault).clone() {
            return Err(TransportError::Fault(message));
        }
        lock(&self.shared.sent).push(frame);
        self.shared.sent_notify.notify_waiters();
        Ok(())
    }

    async fn complete_send(&mut self) -> Result<(), TransportError> {
        self.shared.sends_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Peer handle
// =============================================================================

/// Server-side view of a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<MemoryShared>,
}

impl MemoryPeer {
    /// Queues the answer for the next scene load.
    pub fn script_scene_response(&self, response: LoadSceneResponse) {
        lock(&self.shared.scene_responses).push_back(Ok(response));
    }

    pub fn script_scene_failure(&self, error: TransportError) {
        lock(&self.shared.scene_responses).push_back(Err(error));
    }

    pub fn fail_next_open(&self, error: TransportError) {
        lock(&self.shared.open_failures).push_back(error);
    }

    /// Every subsequent write fails with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        *lock(&self.shared.write_fault) = Some(message.into());
    }

    fn push(&self, inbound: Inbound) -> bool {
        match lock(&self.shared.stream).as_ref() {
            Some(open) => open.tx.send(inbound).is_ok(),
            None => false,
        }
    }

    /// Delivers a frame on the open stream. False if no stream is open.
    pub fn push_frame(&self, frame: WireFrame) -> bool {
        self.push(Inbound::Frame(frame))
    }

    pub fn push_packet(&self, packet: &Packet) -> bool {
        self.push_frame(WireFrame::from(packet))
    }

    /// Delivers raw JSON, parsed by the reader like a network frame.
    pub fn push_raw(&self, json: impl Into<String>) -> bool {
        self.push(Inbound::Raw(json.into()))
    }

    pub fn push_fault(&self, message: impl Into<String>) -> bool {
        self.push(Inbound::Fault(message.into()))
    }

    pub fn cancel_stream(&self) -> bool {
        self.push(Inbound::Cancel)
    }

    /// Ends the stream from the server side.
    pub fn end_stream(&self) -> bool {
        self.push(Inbound::End)
    }

    pub fn has_open_stream(&self) -> bool {
        lock(&self.shared.stream).is_some()
    }

    pub fn sent_frames(&self) -> Vec<WireFrame> {
        lock(&self.shared.sent).clone()
    }

    pub fn sent_packets(&self) -> Vec<Packet> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| Packet::try_from(frame).ok())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.shared.sent).len()
    }

    /// Waits until at least `count` frames were sent or `timeout` elapses.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.sent_notify.notified();
            if self.sent_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent_count() >= count;
            }
        }
    }

    pub fn scene_requests(&self) -> Vec<LoadSceneRequest> {
        lock(&self.shared.scene_requests).clone()
    }

    pub fn stream_headers(&self) -> Vec<StreamHeaders> {
        lock(&self.shared.headers).clone()
    }

    pub fn streams_opened(&self) -> usize {
        self.shared.streams_opened.load(Ordering::SeqCst)
    }

    pub fn sends_completed(&self) -> usize {
        self.shared.sends_completed.load(Ordering::SeqCst)
    }

    pub fn streams_disposed(&self) -> usize {
        self.shared.streams_disposed.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Issues local tokens for any non-empty session token.
pub struct MemoryAuthProvider {
    ttl: chrono::Duration,
    rejection: Option<String>,
    calls: AtomicUsize,
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(1),
            rejection: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Every call fails with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            rejection: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn authenticate(&self, session_token: &str) -> Result<AccessToken, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(reason) = &self.rejection {
            return Err(AuthError::Rejected(reason.clone()));
        }
        if session_token.trim().is_empty() {
            return Err(AuthError::Rejected("empty session token".to_string()));
        }
        Ok(AccessToken::new(
            format!("memory-token-{call}"),
            Utc::now() + self.ttl,
        ))
    }
}
