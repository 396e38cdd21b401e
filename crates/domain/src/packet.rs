//! Typed packet model
//!
//! Every event exchanged with the character service is a [`Packet`]: a set of
//! addressing/correlation attributes common to all events plus exactly one
//! [`PacketPayload`] variant. Holding the payload in a Rust enum makes the
//! "exactly one populated field" rule a property of the type rather than a
//! runtime check; the wire layer is responsible for rejecting frames that do
//! not map onto a single variant.
//!
//! Identity for de-duplication is the [`PacketId`] alone (see
//! [`Packet::same_packet`]); two packets with equal payloads but different ids
//! are distinct events.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{CorrelationId, InteractionId, PacketId, UtteranceId};

// =============================================================================
// Addressing
// =============================================================================

/// Kind of participant on either end of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Player,
    Agent,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One end of a packet route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    /// Agent id for agents, display name for the player. May be empty.
    #[serde(default)]
    pub name: String,
}

impl Actor {
    pub fn player(name: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Player,
            name: name.into(),
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Agent,
            name: name.into(),
        }
    }
}

/// Source/target addressing attached to every packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Routing {
    pub source: Actor,
    pub target: Actor,
}

impl Routing {
    pub fn new(source: Actor, target: Actor) -> Self {
        Self { source, target }
    }

    /// Routing used for everything the local player sends to a character.
    pub fn player_to_agent(agent_id: impl Into<String>) -> Self {
        Self::new(Actor::player(""), Actor::agent(agent_id))
    }

    pub fn agent_to_player(agent_id: impl Into<String>) -> Self {
        Self::new(Actor::agent(agent_id), Actor::player(""))
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// Wall-clock time split the way the wire carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos() as i32,
        }
    }

    /// Returns `None` when the wire carried an out-of-range value.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.nanos).ok()?;
        DateTime::from_timestamp(self.seconds, nanos)
    }
}

// =============================================================================
// Payload types
// =============================================================================

/// Where a text event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Speech,
    Typed,
    Generated,
    Filler,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    pub text: String,
    pub source_type: SourceType,
    /// False for interim speech-recognition hypotheses.
    pub is_final: bool,
}

/// Control actions understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    AudioSessionStart,
    AudioSessionEnd,
    InteractionEnd,
    TtsPlaybackStart,
    TtsPlaybackEnd,
    TtsPlaybackMute,
    TtsPlaybackUnmute,
    WarningEvent,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub action: ControlAction,
    pub description: Option<String>,
    pub payload: Option<String>,
}

impl ControlEvent {
    pub fn new(action: ControlAction) -> Self {
        Self {
            action,
            description: None,
            payload: None,
        }
    }
}

/// Opaque audio frame. Codec details belong to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub chunk: Vec<u8>,
}

/// Opaque animation frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationChunk {
    pub chunk: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionBehavior {
    Disgust,
    Contempt,
    Belligerence,
    Domineering,
    Criticism,
    Anger,
    Tension,
    TenseHumor,
    Defensiveness,
    Whining,
    Sadness,
    Stonewalling,
    Interest,
    Validation,
    Affection,
    Humor,
    Surprise,
    Joy,
    #[default]
    #[serde(other)]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionStrength {
    Weak,
    Normal,
    Strong,
    #[default]
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionEvent {
    pub behavior: EmotionBehavior,
    pub strength: EmotionStrength,
}

/// When a gesture should be played relative to the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GesturePlayback {
    Interaction,
    InteractionEnd,
    Utterance,
    #[default]
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureEvent {
    pub gesture: String,
    pub playback: GesturePlayback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomParameter {
    pub name: String,
    pub value: String,
}

/// Trigger or custom event defined by the scene author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEvent {
    pub name: String,
    pub parameters: Vec<CustomParameter>,
}

impl CustomEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(CustomParameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Opaque session snapshot the server emits so a later session can continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChunk {
    pub data: Vec<u8>,
}

impl StateChunk {
    /// Encoding used wherever the snapshot is persisted or echoed back.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, DomainError> {
        STANDARD
            .decode(encoded)
            .map(|data| Self { data })
            .map_err(|e| DomainError::parse(format!("invalid state snapshot: {e}")))
    }
}

// =============================================================================
// Packet
// =============================================================================

/// Discriminant of a [`PacketPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Text,
    Control,
    Audio,
    Animation,
    Emotion,
    Gesture,
    Custom,
    State,
}

impl PacketKind {
    /// Kinds the host consumes as discrete interaction events, as opposed to
    /// media streams (audio, animation) and session snapshots (state).
    pub fn is_interaction(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Control | Self::Emotion | Self::Gesture | Self::Custom
        )
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Control => "control",
            Self::Audio => "audio",
            Self::Animation => "animation",
            Self::Emotion => "emotion",
            Self::Gesture => "gesture",
            Self::Custom => "custom",
            Self::State => "state",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketPayload {
    Text(TextEvent),
    Control(ControlEvent),
    Audio(AudioChunk),
    Animation(AnimationChunk),
    Emotion(EmotionEvent),
    Gesture(GestureEvent),
    Custom(CustomEvent),
    State(StateChunk),
}

impl PacketPayload {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Text(_) => PacketKind::Text,
            Self::Control(_) => PacketKind::Control,
            Self::Audio(_) => PacketKind::Audio,
            Self::Animation(_) => PacketKind::Animation,
            Self::Emotion(_) => PacketKind::Emotion,
            Self::Gesture(_) => PacketKind::Gesture,
            Self::Custom(_) => PacketKind::Custom,
            Self::State(_) => PacketKind::State,
        }
    }
}

/// A single event on the session stream.
#[derive(Debug, Clone)]
pub struct Packet {
    pub timestamp: Timestamp,
    pub packet_id: PacketId,
    pub interaction_id: Option<InteractionId>,
    pub utterance_id: Option<UtteranceId>,
    pub correlation_id: Option<CorrelationId>,
    pub routing: Routing,
    pub payload: PacketPayload,
}

impl Packet {
    /// Build an outgoing packet stamped with a fresh id and the current time.
    pub fn new(routing: Routing, payload: PacketPayload) -> Self {
        Self {
            timestamp: Timestamp::now(),
            packet_id: PacketId::new(),
            interaction_id: None,
            utterance_id: None,
            correlation_id: None,
            routing,
            payload,
        }
    }

    pub fn text(routing: Routing, text: impl Into<String>) -> Self {
        Self::new(
            routing,
            PacketPayload::Text(TextEvent {
                text: text.into(),
                source_type: SourceType::Typed,
                is_final: true,
            }),
        )
    }

    pub fn control(routing: Routing, action: ControlAction) -> Self {
        Self::new(routing, PacketPayload::Control(ControlEvent::new(action)))
    }

    pub fn audio(routing: Routing, chunk: Vec<u8>) -> Self {
        Self::new(routing, PacketPayload::Audio(AudioChunk { chunk }))
    }

    pub fn custom(routing: Routing, event: CustomEvent) -> Self {
        Self::new(routing, PacketPayload::Custom(event))
    }

    pub fn with_interaction_id(mut self, id: InteractionId) -> Self {
        self.interaction_id = Some(id);
        self
    }

    pub fn with_utterance_id(mut self, id: UtteranceId) -> Self {
        self.utterance_id = Some(id);
        self
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn kind(&self) -> PacketKind {
        self.payload.kind()
    }

    /// Identity comparison used for de-duplication.
    pub fn same_packet(&self, other: &Packet) -> bool {
        self.packet_id == other.packet_id
    }

    pub fn as_text(&self) -> Option<&TextEvent> {
        match &self.payload {
            PacketPayload::Text(text) => Some(text),
            _ => None,
        }
    }
}
