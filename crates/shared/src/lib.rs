//! Persona Shared - wire contracts for the streaming session protocol
//!
//! This crate contains the serialized shapes exchanged with the character
//! service and their conversions to the typed domain model:
//! - Stream frames ([`WireFrame`]) and their packet conversions
//! - Scene-load request/response
//! - Token exchange request/response
//!
//! # Design Principles
//!
//! 1. **No I/O** - pure data types and serialization
//! 2. **Explicit discriminants** - every event carries a `type` tag
//! 3. **Forward compatible** - unknown tags parse, then fail conversion with a typed error

pub mod auth;
pub mod frames;
pub mod scene;

pub use auth::{GenerateTokenRequest, GenerateTokenResponse};
pub use frames::{DataChunkType, FrameError, WireEvent, WireFrame, WirePacketIds, WireTimestamp};
pub use scene::{
    AgentInfo, Capabilities, ClientDescriptor, LoadSceneRequest, LoadSceneResponse,
    PreviousState, UserDescriptor,
};
