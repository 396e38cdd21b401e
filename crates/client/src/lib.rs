//! Persona Client - streaming session client for conversational characters.
//!
//! ## Layout
//!
//! - `connection` - per-session bounded queues between stream tasks and the host
//! - `engine` - lifecycle state machine, reader/writer/supervisor tasks
//! - `client` - the cloneable facade a host application holds
//! - `ports` - traits for the auth service, scene descriptors and transport
//! - `infrastructure` - HTTP, WebSocket and in-memory adapters
//! - `config` - environment-driven configuration

pub mod client;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod infrastructure;
pub mod ports;

pub use client::Client;
pub use config::{ClientConfig, OverflowPolicy, QueueConfig, QueueSettings};
pub use connection::{ConnectionState, ConnectionStats, QueueKind, QueueStats};
pub use engine::{MetricsSnapshot, SceneLoadResult, SessionEngine, SessionFault};
pub use error::{AuthError, ClientError, QueueError, TransportError};
