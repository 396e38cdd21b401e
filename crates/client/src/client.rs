//! Host-facing facade.
//!
//! [`Client`] is cheap to clone and safe to share across threads. Lifecycle
//! calls are `async`; pollers and send calls are synchronous and never block
//! on the network, so a host can call them every frame.

use std::sync::Arc;

use tokio::sync::broadcast;

use persona_domain::{
    AccessToken, ControlAction, Packet, Routing, RuntimeEvent, SessionKey, SessionState,
};

use crate::config::ClientConfig;
use crate::connection::{ConnectionStats, QueueKind};
use crate::engine::{MetricsSnapshot, SceneLoadResult, SessionEngine, SessionFault};
use crate::error::ClientError;
use crate::infrastructure::{MemoryAuthProvider, MemoryPeer, MemoryTransport, StaticSceneConfig};
use crate::ports::{AuthProvider, SceneConfigProvider, Transport};

#[derive(Clone)]
pub struct Client {
    engine: Arc<SessionEngine>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        scene_config: Arc<dyn SceneConfigProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            engine: Arc::new(SessionEngine::new(config, auth, scene_config, transport)),
        }
    }

    /// Client wired to the in-process loopback transport, plus the handle
    /// that plays the server side.
    pub fn in_memory(config: ClientConfig) -> (Self, MemoryPeer) {
        let transport = MemoryTransport::new();
        let peer = transport.peer();
        let scene_config = StaticSceneConfig::from_config(&config);
        let client = Self::new(
            config,
            Arc::new(MemoryAuthProvider::new()),
            Arc::new(scene_config),
            Arc::new(transport),
        );
        (client, peer)
    }

    pub fn config(&self) -> &ClientConfig {
        self.engine.config()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Exchanges `session_token` for an access token through the auth provider.
    ///
    /// Emits `InitSuccess` or `InitFailed`.
    pub async fn authenticate(&self, session_token: &str) -> Result<(), ClientError> {
        self.engine.authenticate(session_token).await
    }

    /// Completes authentication with a token the host acquired itself.
    pub fn on_auth_complete(&self, token: AccessToken) -> Result<(), ClientError> {
        self.engine.on_auth_complete(token)
    }

    pub fn on_auth_failed(&self, reason: &str) -> Result<(), ClientError> {
        self.engine.on_auth_failed(reason)
    }

    /// Negotiates a session for `scene_name`, continuing from
    /// [`Client::last_state`] when one is held.
    ///
    /// Emits `LoadSceneComplete` or `LoadSceneFailed`.
    pub async fn load_scene(&self, scene_name: &str) -> Result<SceneLoadResult, ClientError> {
        self.engine.load_scene(scene_name).await
    }

    /// Opens the stream for the loaded scene. Fails fast, opening nothing,
    /// unless a scene is loaded and no session is running.
    pub async fn start_session(&self) -> Result<(), ClientError> {
        self.engine.start_session().await
    }

    pub async fn end_session(&self) {
        self.engine.end_session().await
    }

    pub async fn destroy(&self) {
        self.engine.destroy().await
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Queues `packet` for the writer task.
    pub fn send_event(&self, packet: Packet) -> Result<(), ClientError> {
        self.engine.send_packet(packet)
    }

    pub fn send_text(&self, agent_id: &str, text: &str) -> Result<(), ClientError> {
        self.send_event(Packet::text(Routing::player_to_agent(agent_id), text))
    }

    /// Announces the start of a microphone stream. No-op unless streaming.
    pub fn start_audio(&self, routing: Routing) -> Result<(), ClientError> {
        self.engine
            .send_if_streaming(Packet::control(routing, ControlAction::AudioSessionStart))
            .map(|_| ())
    }

    /// Queues one audio chunk. No-op unless streaming.
    pub fn send_audio(&self, routing: Routing, chunk: Vec<u8>) -> Result<(), ClientError> {
        self.engine
            .send_if_streaming(Packet::audio(routing, chunk))
            .map(|_| ())
    }

    /// No-op unless streaming.
    pub fn end_audio(&self, routing: Routing) -> Result<(), ClientError> {
        self.engine
            .send_if_streaming(Packet::control(routing, ControlAction::AudioSessionEnd))
            .map(|_| ())
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Next text, control, emotion, gesture or custom event, if any.
    pub fn try_get_incoming_event(&self) -> Option<Packet> {
        self.engine.try_dequeue(QueueKind::Interaction)
    }

    pub fn try_get_audio_chunk(&self) -> Option<Packet> {
        self.engine.try_dequeue(QueueKind::Audio)
    }

    pub fn try_get_animation_chunk(&self) -> Option<Packet> {
        self.engine.try_dequeue(QueueKind::Animation)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.engine.subscribe()
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.engine.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.engine.is_authenticated()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.engine.access_token()
    }

    pub fn is_session_initialized(&self) -> bool {
        self.engine.is_session_initialized()
    }

    pub fn session_started(&self) -> bool {
        self.engine.session_started()
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        self.engine.session_key()
    }

    /// Base64 snapshot of the most recent session, for persistence by the host.
    pub fn last_state(&self) -> Option<String> {
        self.engine.last_state()
    }

    pub fn set_last_state(&self, encoded: Option<String>) -> Result<(), ClientError> {
        self.engine.set_last_state(encoded)
    }

    /// Drains the faults captured from stream tasks.
    pub fn take_errors(&self) -> Vec<SessionFault> {
        self.engine.take_errors()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.engine.metrics()
    }

    /// `None` when no session is streaming.
    pub fn queue_stats(&self) -> Option<ConnectionStats> {
        self.engine.queue_stats()
    }
}
