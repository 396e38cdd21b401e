//! Session engine
//!
//! Drives the session lifecycle through [`SessionState`] and owns the stream
//! tasks while a session is open:
//!
//! - **reader** awaits inbound frames and routes them into the connection queues
//! - **writer** drains the outgoing queue onto the stream every send interval
//! - **supervisor** waits for both, then tears the session down
//!
//! All three share one [`CancellationToken`] per session. Every blocking await
//! inside a task is raced against it, so ending a session interrupts a reader
//! stuck on a slow network read.
//!
//! Host-facing calls take short `std::sync` critical sections only and never
//! wait on the network, except the lifecycle calls that are `async` by nature.

mod dispatch;
mod metrics;
mod reader;
mod supervisor;
mod writer;

pub use dispatch::{destination, Destination};
pub use metrics::{MetricsSnapshot, SessionFault, SessionMetrics};

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use persona_domain::{
    AccessToken, AgentId, DomainError, Packet, RuntimeEvent, RuntimeStatus, SessionContext,
    SessionKey, SessionState, TextEvent,
};
use persona_shared::{AgentInfo, LoadSceneRequest};

use crate::config::ClientConfig;
use crate::connection::{ConnectionState, ConnectionStats, QueueKind};
use crate::error::{AuthError, ClientError, TransportError};
use crate::ports::{AuthProvider, DuplexStream, SceneConfigProvider, StreamHeaders, Transport};

use metrics::FaultLog;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a stream that opened after its session was already ended.
async fn discard_stream(mut stream: DuplexStream) {
    if let Err(e) = stream.writer.complete_send().await {
        tracing::debug!(error = %e, "complete_send failed on discarded stream");
    }
    stream.reader.dispose().await;
}

/// Outcome of a successful scene load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLoadResult {
    pub session_key: SessionKey,
    /// Text events replayed from the continued session, oldest first.
    pub previous_state_summary: Vec<TextEvent>,
    pub agents: Vec<AgentInfo>,
}

impl SceneLoadResult {
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.agent_id.clone()).collect()
    }
}

/// The session owned by the engine. `supervisor` is `None` while the stream
/// is still opening.
struct ActiveSession {
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

/// State shared between the engine and its stream tasks.
pub(crate) struct EngineState {
    state: Mutex<SessionState>,
    token: Mutex<Option<AccessToken>>,
    context: Mutex<SessionContext>,
    connection: RwLock<Option<Arc<ConnectionState>>>,
    active: Mutex<Option<ActiveSession>>,
    metrics: SessionMetrics,
    faults: FaultLog,
    events: broadcast::Sender<RuntimeEvent>,
}

impl EngineState {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(SessionState::Idle),
            token: Mutex::new(None),
            context: Mutex::new(SessionContext::new()),
            connection: RwLock::new(None),
            active: Mutex::new(None),
            metrics: SessionMetrics::default(),
            faults: FaultLog::default(),
            events,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Validated transition. Returns the previous state.
    fn transition(&self, to: SessionState) -> Result<SessionState, DomainError> {
        let mut state = lock(&self.state);
        let from = *state;
        *state = from.transition(to)?;
        drop(state);
        tracing::info!(from = %from, to = %to, "Session state changed");
        Ok(from)
    }

    /// Transition requested by the host; a refusal is a precondition error.
    fn transition_for(
        &self,
        operation: &'static str,
        to: SessionState,
    ) -> Result<SessionState, ClientError> {
        self.transition(to).map_err(|_| {
            let state = self.state();
            tracing::debug!(operation, state = %state, "Operation refused");
            ClientError::precondition(operation, state)
        })
    }

    fn force_state(&self, to: SessionState) {
        let mut state = lock(&self.state);
        let from = std::mem::replace(&mut *state, to);
        drop(state);
        if from != to {
            tracing::info!(from = %from, to = %to, "Session state reset");
        }
    }

    fn connection(&self) -> Option<Arc<ConnectionState>> {
        self.connection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_connection(&self, connection: Option<Arc<ConnectionState>>) {
        *self
            .connection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = connection;
    }

    fn emit(&self, event: RuntimeEvent) {
        tracing::debug!(status = %event.status, message = %event.message, "Runtime event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn record_fault(&self, message: &str) {
        tracing::error!(error = %message, "Session fault");
        self.faults.record(message);
    }

    /// Final teardown steps shared by every way a session can end.
    ///
    /// Moves `Streaming -> Closing -> Closed`, discards the queues and the
    /// session key, then notifies the host. `fault` becomes the notification
    /// message.
    pub(crate) fn finish_session(&self, fault: Option<String>) {
        if self.state() == SessionState::Streaming {
            if let Err(e) = self.transition(SessionState::Closing) {
                tracing::warn!(error = %e, "Unexpected state while closing session");
            }
        }

        self.set_connection(None);
        lock(&self.context).clear_session();

        match self.state() {
            SessionState::Closing => {
                if let Err(e) = self.transition(SessionState::Closed) {
                    tracing::warn!(error = %e, "Unexpected state while closing session");
                }
            }
            other => {
                // destroy() may have reset the engine concurrently
                tracing::debug!(state = %other, "Session finished outside the streaming path");
            }
        }

        let message = fault.unwrap_or_default();
        tracing::info!(graceful = message.is_empty(), "Session closed");
        self.emit(RuntimeEvent::new(RuntimeStatus::SessionClosed, message));
    }
}

/// Per-session handle shared by the stream tasks.
pub(crate) struct SessionRuntime {
    pub(crate) engine: Arc<EngineState>,
    pub(crate) connection: Arc<ConnectionState>,
    pub(crate) cancel: CancellationToken,
    fault: Mutex<Option<String>>,
}

impl SessionRuntime {
    fn new(
        engine: Arc<EngineState>,
        connection: Arc<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            connection,
            cancel,
            fault: Mutex::new(None),
        }
    }

    /// Records a fatal task error and ends the session. The first fault wins.
    pub(crate) fn fail(&self, message: String) {
        self.engine.record_fault(&message);
        lock(&self.fault).get_or_insert(message);
        self.cancel.cancel();
    }

    pub(crate) fn take_fault(&self) -> Option<String> {
        lock(&self.fault).take()
    }
}

/// Lifecycle owner for one client.
pub struct SessionEngine {
    config: ClientConfig,
    auth: Arc<dyn AuthProvider>,
    scene_config: Arc<dyn SceneConfigProvider>,
    transport: Arc<dyn Transport>,
    shared: Arc<EngineState>,
}

impl SessionEngine {
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        scene_config: Arc<dyn SceneConfigProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            auth,
            scene_config,
            transport,
            shared: Arc::new(EngineState::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn authenticate(&self, session_token: &str) -> Result<(), ClientError> {
        self.shared
            .transition_for("authenticate", SessionState::Authenticating)?;

        match self.auth.authenticate(session_token).await {
            Ok(token) => {
                self.complete_authentication(token);
                Ok(())
            }
            Err(e) => {
                self.fail_authentication(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Accepts a token acquired by the host.
    pub fn on_auth_complete(&self, token: AccessToken) -> Result<(), ClientError> {
        if self.shared.state() != SessionState::Authenticating {
            self.shared
                .transition_for("complete authentication", SessionState::Authenticating)?;
        }
        self.complete_authentication(token);
        Ok(())
    }

    /// Reports an authentication failure observed by the host.
    pub fn on_auth_failed(&self, reason: &str) -> Result<(), ClientError> {
        match self.shared.state() {
            SessionState::Authenticating | SessionState::Idle => {
                self.fail_authentication(reason.to_string());
                Ok(())
            }
            other => Err(ClientError::precondition("fail authentication", other)),
        }
    }

    fn complete_authentication(&self, token: AccessToken) {
        tracing::info!(expires_at = %token.expires_at, "Authenticated");
        *lock(&self.shared.token) = Some(token);
        if let Err(e) = self.shared.transition(SessionState::Authenticated) {
            tracing::warn!(error = %e, "Authentication completed in unexpected state");
        }
        self.shared.emit(RuntimeEvent::ok(RuntimeStatus::InitSuccess));
    }

    fn fail_authentication(&self, reason: String) {
        tracing::warn!(reason = %reason, "Authentication failed");
        *lock(&self.shared.token) = None;
        if self.shared.state() == SessionState::Authenticating {
            self.shared.force_state(SessionState::Idle);
        }
        self.shared
            .emit(RuntimeEvent::new(RuntimeStatus::InitFailed, reason));
    }

    // =========================================================================
    // Scene
    // =========================================================================

    pub async fn load_scene(&self, scene_name: &str) -> Result<SceneLoadResult, ClientError> {
        let scene_name = scene_name.trim();
        if scene_name.is_empty() {
            return Err(DomainError::validation("scene name cannot be empty").into());
        }

        self.shared
            .transition_for("load a scene", SessionState::SceneLoading)?;
        lock(&self.shared.context).clear_session();
        tracing::info!(scene = scene_name, "Loading scene");

        match self.request_scene(scene_name).await {
            Ok(result) => {
                lock(&self.shared.context).set_session_key(result.session_key.clone());
                if let Err(e) = self.shared.transition(SessionState::SceneLoaded) {
                    tracing::warn!(error = %e, "Scene loaded in unexpected state");
                }
                tracing::info!(
                    session_key = %result.session_key,
                    agents = result.agents.len(),
                    "Scene loaded"
                );
                self.shared
                    .emit(RuntimeEvent::ok(RuntimeStatus::LoadSceneComplete));
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(scene = scene_name, error = %e, "Scene load failed");
                if self.shared.state() == SessionState::SceneLoading {
                    self.shared.force_state(SessionState::Authenticated);
                }
                self.shared
                    .emit(RuntimeEvent::new(RuntimeStatus::LoadSceneFailed, e.to_string()));
                Err(e)
            }
        }
    }

    async fn request_scene(&self, scene_name: &str) -> Result<SceneLoadResult, ClientError> {
        let token = lock(&self.shared.token).clone().ok_or(AuthError::Missing)?;
        if token.is_expired_at(chrono::Utc::now()) {
            return Err(AuthError::Expired.into());
        }

        let request = LoadSceneRequest {
            scene: scene_name.to_string(),
            capabilities: self.scene_config.capabilities(),
            user: self.scene_config.user(),
            client: self.scene_config.client(),
            previous_state: lock(&self.shared.context).last_state().map(str::to_string),
        };

        let response = self.transport.load_scene(&token, request).await?;
        let session_key = SessionKey::parse(&response.key)
            .map_err(|e| ClientError::scene_load(format!("server returned no session key: {e}")))?;

        Ok(SceneLoadResult {
            session_key,
            previous_state_summary: response
                .previous_state
                .map(|previous| previous.text_events())
                .unwrap_or_default(),
            agents: response.agents,
        })
    }

    // =========================================================================
    // Streaming session
    // =========================================================================

    pub async fn start_session(&self) -> Result<(), ClientError> {
        let cancel = CancellationToken::new();

        // Check-and-set under the state lock so only one caller can win. The
        // session is registered before the stream opens so end_session and
        // destroy can interrupt the open.
        let (token, key) = {
            let mut state = lock(&self.shared.state);
            if *state != SessionState::SceneLoaded {
                return Err(ClientError::precondition("start a session", *state));
            }
            let token = lock(&self.shared.token)
                .clone()
                .ok_or(AuthError::Missing)?;
            let key = lock(&self.shared.context)
                .session_key()
                .cloned()
                .ok_or_else(|| ClientError::precondition("start a session", *state))?;
            *state = SessionState::Streaming;
            *lock(&self.shared.active) = Some(ActiveSession {
                cancel: cancel.clone(),
                supervisor: None,
            });
            (token, key)
        };
        tracing::info!(session_key = %key, "Opening session stream");

        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.transport.open_stream(StreamHeaders::new(&token, &key)) => result,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                // Whoever took the pending session tears it down.
                let pending = lock(&self.shared.active).take();
                if pending.is_none() || cancel.is_cancelled() {
                    tracing::info!(session_key = %key, "Session ended while its stream was opening");
                    return Err(TransportError::Cancelled.into());
                }
                let message = e.to_string();
                self.shared.record_fault(&message);
                self.shared.finish_session(Some(message));
                return Err(e.into());
            }
        };

        let state = self.shared.state();
        if state != SessionState::Streaming {
            lock(&self.shared.active).take();
            cancel.cancel();
            discard_stream(stream).await;
            return Err(ClientError::precondition("start a session", state));
        }

        // The registry lock is held until the supervisor is in place, so
        // end_session sees either the pending session or the running one.
        let abandoned = {
            let mut active = lock(&self.shared.active);
            match active.as_mut() {
                Some(pending) if !cancel.is_cancelled() => {
                    pending.supervisor = Some(self.launch(stream, cancel));
                    None
                }
                _ => Some(stream),
            }
        };
        if let Some(stream) = abandoned {
            tracing::info!(session_key = %key, "Session ended while its stream was opening");
            discard_stream(stream).await;
            return Err(TransportError::Cancelled.into());
        }

        tracing::info!(session_key = %key, "Session started");
        Ok(())
    }

    /// Allocates the queues and spawns the stream tasks for an opened stream.
    fn launch(&self, stream: DuplexStream, cancel: CancellationToken) -> JoinHandle<()> {
        let connection = Arc::new(ConnectionState::new(&self.config.queues));
        self.shared.set_connection(Some(Arc::clone(&connection)));
        let runtime = Arc::new(SessionRuntime::new(
            Arc::clone(&self.shared),
            connection,
            cancel,
        ));

        self.shared.metrics.record_session_started();
        self.shared
            .emit(RuntimeEvent::ok(RuntimeStatus::SessionStarted));

        let reader = tokio::spawn(reader::run(stream.reader, Arc::clone(&runtime)));
        let writer = tokio::spawn(writer::run(
            stream.writer,
            Arc::clone(&runtime),
            self.config.send_interval,
        ));
        tokio::spawn(supervisor::run(runtime, reader, writer))
    }

    /// Cancels the open session and waits for teardown. No-op without one.
    pub async fn end_session(&self) {
        let active = lock(&self.shared.active).take();
        let Some(active) = active else {
            tracing::debug!("end_session: no session is streaming");
            return;
        };

        tracing::info!("Ending session");
        active.cancel.cancel();
        match active.supervisor {
            Some(supervisor) => {
                if let Err(e) = supervisor.await {
                    let message = format!("session supervisor failed: {e}");
                    self.shared.record_fault(&message);
                    self.shared.finish_session(Some(message));
                }
            }
            // start_session sees the cancellation and spawns nothing
            None => self.shared.finish_session(None),
        }
    }

    /// Ends any session, shuts the transport down and resets to `Idle`.
    pub async fn destroy(&self) {
        self.end_session().await;
        self.transport.shutdown().await;

        *lock(&self.shared.token) = None;
        lock(&self.shared.context).clear_session();
        self.shared.set_connection(None);
        self.shared.force_state(SessionState::Idle);
        tracing::info!("Client destroyed");
    }

    // =========================================================================
    // Outgoing
    // =========================================================================

    fn streaming_connection(&self) -> Option<Arc<ConnectionState>> {
        if self.shared.state() != SessionState::Streaming {
            return None;
        }
        self.shared.connection()
    }

    pub fn send_packet(&self, packet: Packet) -> Result<(), ClientError> {
        let connection = self
            .streaming_connection()
            .ok_or_else(|| ClientError::precondition("send an event", self.shared.state()))?;
        tracing::debug!(kind = %packet.kind(), packet_id = %packet.packet_id, "Queueing outgoing packet");
        connection.enqueue_outgoing(packet)?;
        Ok(())
    }

    /// Like [`SessionEngine::send_packet`], but silently skipped when no session is streaming.
    pub fn send_if_streaming(&self, packet: Packet) -> Result<bool, ClientError> {
        match self.streaming_connection() {
            Some(connection) => {
                connection.enqueue_outgoing(packet)?;
                Ok(true)
            }
            None => {
                tracing::trace!(kind = %packet.kind(), "No session streaming, packet skipped");
                Ok(false)
            }
        }
    }

    // =========================================================================
    // Polling and status
    // =========================================================================

    pub fn try_dequeue(&self, kind: QueueKind) -> Option<Packet> {
        self.shared.connection()?.try_dequeue(kind)
    }

    pub fn queue_stats(&self) -> Option<ConnectionStats> {
        self.shared.connection().map(|c| c.stats())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.state().is_authenticated() && lock(&self.shared.token).is_some()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        lock(&self.shared.token).clone()
    }

    pub fn is_session_initialized(&self) -> bool {
        lock(&self.shared.context).is_session_initialized()
    }

    /// True while the stream is open and not yet cancelled.
    pub fn session_started(&self) -> bool {
        self.shared.state() == SessionState::Streaming
            && lock(&self.shared.active)
                .as_ref()
                .is_some_and(|active| active.supervisor.is_some() && !active.cancel.is_cancelled())
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        lock(&self.shared.context).session_key().cloned()
    }

    pub fn last_state(&self) -> Option<String> {
        lock(&self.shared.context).last_state().map(str::to_string)
    }

    /// Restores a snapshot persisted by the host before the next scene load.
    pub fn set_last_state(&self, encoded: Option<String>) -> Result<(), ClientError> {
        lock(&self.shared.context).restore_state(encoded)?;
        Ok(())
    }

    pub fn take_errors(&self) -> Vec<SessionFault> {
        self.shared.faults.take()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}
