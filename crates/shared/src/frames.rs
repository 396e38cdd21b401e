//! Wire frames for the session stream
//!
//! Every frame carries an explicit `type` discriminant for its event, and data
//! chunks carry a second `chunk_type` discriminant. Decoding never sniffs which
//! fields happen to be populated: the tag alone decides the packet variant.
//!
//! ## Versioning Policy
//!
//! - New event types can be added at any time (forward compatible)
//! - Unknown `type`/`chunk_type` values deserialize to `Unknown` so a newer
//!   server never breaks frame parsing; converting such a frame into a
//!   [`Packet`] yields a [`FrameError`] the client counts and drops.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use persona_domain::{
    AnimationChunk, AudioChunk, ControlAction, ControlEvent, CorrelationId, CustomEvent,
    CustomParameter, EmotionBehavior, EmotionEvent, EmotionStrength, GestureEvent,
    GesturePlayback, InteractionId, Packet, PacketId, PacketPayload, Routing, SourceType,
    StateChunk, TextEvent, Timestamp, UtteranceId,
};

// =============================================================================
// Errors
// =============================================================================

/// A frame that parsed as JSON but does not map onto exactly one packet variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unrecognized event type")]
    UnknownEventType,
    #[error("unrecognized data chunk type")]
    UnknownChunkType,
    #[error("invalid base64 in {chunk_type} chunk: {message}")]
    InvalidChunkData {
        chunk_type: DataChunkType,
        message: String,
    },
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl FrameError {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnknownEventType => "unknown_event_type",
            Self::UnknownChunkType => "unknown_chunk_type",
            Self::InvalidChunkData { .. } => "invalid_chunk_data",
            Self::Malformed(_) => "malformed",
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WireTimestamp {
    #[serde(default)]
    pub seconds: i64,
    #[serde(default)]
    pub nanos: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WirePacketIds {
    pub packet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataChunkType {
    Audio,
    Animation,
    State,
    /// Forward-compatibility fallback for newer chunk types.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DataChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Animation => write!(f, "animation"),
            Self::State => write!(f, "state"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Event carried by a frame, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Text {
        text: String,
        #[serde(default)]
        source_type: SourceType,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    Control {
        action: ControlAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
    },
    DataChunk {
        chunk_type: DataChunkType,
        /// Base64-encoded bytes
        #[serde(default)]
        data: String,
    },
    Emotion {
        #[serde(default)]
        behavior: EmotionBehavior,
        #[serde(default)]
        strength: EmotionStrength,
    },
    Gesture {
        gesture: String,
        #[serde(default)]
        playback: GesturePlayback,
    },
    Custom {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        parameters: Vec<CustomParameter>,
    },
    /// Unknown event type for forward compatibility
    ///
    /// When deserializing an unknown variant, this variant is used instead of
    /// failing; conversion to a packet reports it as a [`FrameError`].
    #[serde(other)]
    Unknown,
}

/// One JSON frame on the session stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(default)]
    pub timestamp: WireTimestamp,
    #[serde(default)]
    pub packet_id: WirePacketIds,
    #[serde(default)]
    pub routing: Routing,
    pub event: WireEvent,
}

impl WireFrame {
    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes the frame into the typed packet model.
    pub fn into_packet(self) -> Result<Packet, FrameError> {
        Packet::try_from(self)
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn decode_chunk(chunk_type: DataChunkType, data: &str) -> Result<Vec<u8>, FrameError> {
    STANDARD
        .decode(data)
        .map_err(|e| FrameError::InvalidChunkData {
            chunk_type,
            message: e.to_string(),
        })
}

fn non_empty<T: From<String>>(value: Option<String>) -> Option<T> {
    value.filter(|v| !v.is_empty()).map(T::from)
}

impl TryFrom<WireEvent> for PacketPayload {
    type Error = FrameError;

    fn try_from(event: WireEvent) -> Result<Self, Self::Error> {
        Ok(match event {
            WireEvent::Text {
                text,
                source_type,
                is_final,
            } => PacketPayload::Text(TextEvent {
                text,
                source_type,
                is_final,
            }),
            WireEvent::Control {
                action,
                description,
                payload,
            } => PacketPayload::Control(ControlEvent {
                action,
                description,
                payload,
            }),
            WireEvent::DataChunk { chunk_type, data } => match chunk_type {
                DataChunkType::Audio => PacketPayload::Audio(AudioChunk {
                    chunk: decode_chunk(chunk_type, &data)?,
                }),
                DataChunkType::Animation => PacketPayload::Animation(AnimationChunk {
                    chunk: decode_chunk(chunk_type, &data)?,
                }),
                DataChunkType::State => PacketPayload::State(StateChunk {
                    data: decode_chunk(chunk_type, &data)?,
                }),
                DataChunkType::Unknown => return Err(FrameError::UnknownChunkType),
            },
            WireEvent::Emotion { behavior, strength } => {
                PacketPayload::Emotion(EmotionEvent { behavior, strength })
            }
            WireEvent::Gesture { gesture, playback } => {
                PacketPayload::Gesture(GestureEvent { gesture, playback })
            }
            WireEvent::Custom { name, parameters } => {
                PacketPayload::Custom(CustomEvent { name, parameters })
            }
            WireEvent::Unknown => return Err(FrameError::UnknownEventType),
        })
    }
}

impl From<&PacketPayload> for WireEvent {
    fn from(payload: &PacketPayload) -> Self {
        match payload {
            PacketPayload::Text(text) => WireEvent::Text {
                text: text.text.clone(),
                source_type: text.source_type,
                is_final: text.is_final,
            },
            PacketPayload::Control(control) => WireEvent::Control {
                action: control.action,
                description: control.description.clone(),
                payload: control.payload.clone(),
            },
            PacketPayload::Audio(audio) => WireEvent::DataChunk {
                chunk_type: DataChunkType::Audio,
                data: STANDARD.encode(&audio.chunk),
            },
            PacketPayload::Animation(animation) => WireEvent::DataChunk {
                chunk_type: DataChunkType::Animation,
                data: STANDARD.encode(&animation.chunk),
            },
            PacketPayload::Emotion(emotion) => WireEvent::Emotion {
                behavior: emotion.behavior,
                strength: emotion.strength,
            },
            PacketPayload::Gesture(gesture) => WireEvent::Gesture {
                gesture: gesture.gesture.clone(),
                playback: gesture.playback,
            },
            PacketPayload::Custom(custom) => WireEvent::Custom {
                name: custom.name.clone(),
                parameters: custom.parameters.clone(),
            },
            PacketPayload::State(state) => WireEvent::DataChunk {
                chunk_type: DataChunkType::State,
                data: state.to_base64(),
            },
        }
    }
}

impl TryFrom<WireFrame> for Packet {
    type Error = FrameError;

    fn try_from(frame: WireFrame) -> Result<Self, Self::Error> {
        let payload = PacketPayload::try_from(frame.event)?;
        let ids = frame.packet_id;

        Ok(Packet {
            timestamp: Timestamp {
                seconds: frame.timestamp.seconds,
                nanos: frame.timestamp.nanos,
            },
            packet_id: if ids.packet_id.is_empty() {
                // Some server events (e.g. control acks) omit the id
                PacketId::new()
            } else {
                PacketId::from(ids.packet_id)
            },
            interaction_id: non_empty::<InteractionId>(ids.interaction_id),
            utterance_id: non_empty::<UtteranceId>(ids.utterance_id),
            correlation_id: non_empty::<CorrelationId>(ids.correlation_id),
            routing: frame.routing,
            payload,
        })
    }
}

impl From<&Packet> for WireFrame {
    fn from(packet: &Packet) -> Self {
        WireFrame {
            timestamp: WireTimestamp {
                seconds: packet.timestamp.seconds,
                nanos: packet.timestamp.nanos,
            },
            packet_id: WirePacketIds {
                packet_id: packet.packet_id.to_string(),
                interaction_id: packet.interaction_id.as_ref().map(ToString::to_string),
                utterance_id: packet.utterance_id.as_ref().map(ToString::to_string),
                correlation_id: packet.correlation_id.as_ref().map(ToString::to_string),
            },
            routing: packet.routing.clone(),
            event: WireEvent::from(&packet.payload),
        }
    }
}
