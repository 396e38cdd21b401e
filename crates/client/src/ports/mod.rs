//! Collaborator ports.
//!
//! The engine never talks to the network, the auth service or the host's
//! scene data directly; it goes through these traits. Production adapters
//! live in [`crate::infrastructure`].

mod auth;
mod scene;
mod transport;

pub use auth::AuthProvider;
pub use scene::SceneConfigProvider;
pub use transport::{DuplexStream, StreamHeaders, StreamReader, StreamWriter, Transport};

#[cfg(test)]
pub use auth::MockAuthProvider;
#[cfg(test)]
pub use scene::MockSceneConfigProvider;
#[cfg(test)]
pub use transport::MockTransport;
