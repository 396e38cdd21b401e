//! Persona Domain - core types for streaming character sessions.
//!
//! Pure data and state-machine logic with no I/O: the typed packet model,
//! correlation ids, the session lifecycle, and the notifications the client
//! surfaces to its host.

pub mod auth;
pub mod error;
pub mod ids;
pub mod packet;
pub mod session;
pub mod status;

pub use auth::AccessToken;
pub use error::DomainError;
pub use ids::{AgentId, CorrelationId, InteractionId, PacketId, UtteranceId};
pub use packet::{
    Actor, ActorKind, AnimationChunk, AudioChunk, ControlAction, ControlEvent, CustomEvent,
    CustomParameter, EmotionBehavior, EmotionEvent, EmotionStrength, GestureEvent,
    GesturePlayback, Packet, PacketKind, PacketPayload, Routing, SourceType, StateChunk,
    TextEvent, Timestamp,
};
pub use session::{SessionContext, SessionKey, SessionState};
pub use status::{RuntimeEvent, RuntimeStatus};
