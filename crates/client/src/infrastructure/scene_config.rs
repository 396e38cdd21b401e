use persona_shared::{Capabilities, ClientDescriptor, UserDescriptor};

use crate::config::ClientConfig;
use crate::ports::SceneConfigProvider;

/// Fixed descriptors taken from [`ClientConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSceneConfig {
    capabilities: Capabilities,
    user: UserDescriptor,
    client: ClientDescriptor,
}

impl StaticSceneConfig {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            capabilities: Capabilities::default(),
            user: UserDescriptor {
                id: config.user_id.clone(),
                name: config.user_name.clone(),
            },
            client: ClientDescriptor {
                id: config.client_id.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl Default for StaticSceneConfig {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl SceneConfigProvider for StaticSceneConfig {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn user(&self) -> UserDescriptor {
        self.user.clone()
    }

    fn client(&self) -> ClientDescriptor {
        self.client.clone()
    }
}
