//! Scene-load contract
//!
//! A scene load is a unary call made before the stream opens. The request
//! describes the client and optionally carries the snapshot of a previous
//! session; the response returns the session key, the characters in the scene,
//! and the packets the server replays from that previous session.

use serde::{Deserialize, Serialize};

use persona_domain::{AgentId, Packet, TextEvent};

use crate::frames::WireFrame;

// =============================================================================
// Request
// =============================================================================

/// Event kinds the client wants the server to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub text: bool,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub animations: bool,
    #[serde(default)]
    pub emotions: bool,
    #[serde(default)]
    pub gestures: bool,
    #[serde(default)]
    pub interruptions: bool,
    #[serde(default)]
    pub triggers: bool,
    #[serde(default)]
    pub narrated_actions: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            text: true,
            audio: true,
            animations: false,
            emotions: true,
            gestures: true,
            interruptions: true,
            triggers: true,
            narrated_actions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub id: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSceneRequest {
    pub scene: String,
    pub capabilities: Capabilities,
    pub user: UserDescriptor,
    pub client: ClientDescriptor,
    /// Base64 snapshot from the previous session, if continuing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: AgentId,
    /// Resource name of the character definition.
    #[serde(default)]
    pub brain_name: String,
    #[serde(default)]
    pub given_name: String,
}

/// Packets the server replays from the continued session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreviousState {
    #[serde(default)]
    pub packets: Vec<WireFrame>,
}

impl PreviousState {
    /// Text events of the replayed history, in order. Non-text and
    /// undecodable frames are skipped.
    pub fn text_events(&self) -> Vec<TextEvent> {
        self.packets
            .iter()
            .cloned()
            .filter_map(|frame| match Packet::try_from(frame) {
                Ok(packet) => packet.as_text().cloned(),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping undecodable previous-state frame");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSceneResponse {
    /// Compound `{workspace}:{key}` session key.
    pub key: String,
    #[serde(default)]
    pub agents: Vec<AgentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<PreviousState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_previous_state() {
        let request = LoadSceneRequest {
            scene: "demo".into(),
            capabilities: Capabilities::default(),
            user: UserDescriptor::default(),
            client: ClientDescriptor::default(),
            previous_state: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("previous_state").is_none());
        assert_eq!(json["capabilities"]["text"], true);
    }

    #[test]
    fn test_response_text_events_skip_other_frames() {
        let json = r#"{
            "key": "workspaces/demo:abc123",
            "agents": [{"agent_id": "a-1", "given_name": "Ada"}],
            "previous_state": {"packets": [
                {"packet_id": {"packet_id": "1"}, "routing": {"source": {"kind": "player"}, "target": {"kind": "agent", "name": "a-1"}},
                 "event": {"type": "text", "text": "hello", "source_type": "typed", "final": true}},
                {"event": {"type": "emotion", "behavior": "joy"}},
                {"event": {"type": "mystery"}},
                {"event": {"type": "text", "text": "welcome back", "final": true}}
            ]}
        }"#;

        let response: LoadSceneResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.agents[0].agent_id.as_str(), "a-1");
        assert_eq!(response.agents[0].brain_name, "");

        let texts: Vec<String> = response
            .previous_state
            .unwrap()
            .text_events()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["hello", "welcome back"]);
    }
}
