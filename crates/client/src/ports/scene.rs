use persona_shared::{Capabilities, ClientDescriptor, UserDescriptor};

/// Supplies the descriptors sent with every scene load.
#[cfg_attr(test, mockall::automock)]
pub trait SceneConfigProvider: Send + Sync {
    fn capabilities(&self) -> Capabilities;
    fn user(&self) -> UserDescriptor;
    fn client(&self) -> ClientDescriptor;
}
