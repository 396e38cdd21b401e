use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Packet identifiers are issued by both sides of the stream. Locally generated ones are
// UUIDv4 strings, but the server is free to use any opaque string, so the newtypes wrap
// `String` rather than `Uuid` to stay lossless.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// Correlation IDs carried by every packet
define_id!(PacketId);
define_id!(InteractionId);
define_id!(UtteranceId);
define_id!(CorrelationId);

// Scene-load IDs
define_id!(AgentId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique_uuids() {
        let a = PacketId::new();
        let b = PacketId::new();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn server_ids_are_kept_verbatim() {
        let id = InteractionId::from("srv-0001");
        assert_eq!(id.as_str(), "srv-0001");
        assert_eq!(String::from(id), "srv-0001");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = PacketId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
