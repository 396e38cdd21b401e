//! Adapters implementing the collaborator ports.

pub mod http;
pub mod memory;
pub mod scene_config;
pub mod websocket;

pub use http::{HttpApi, HttpAuthProvider};
pub use memory::{MemoryAuthProvider, MemoryPeer, MemoryTransport};
pub use scene_config::StaticSceneConfig;
pub use websocket::WebSocketTransport;
