#![allow(dead_code)]

use std::time::Duration;

use persona_client::infrastructure::MemoryPeer;
use persona_client::{Client, ClientConfig};
use persona_domain::{AgentId, RuntimeEvent, RuntimeStatus};
use persona_shared::{AgentInfo, LoadSceneResponse};
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn fast_config() -> ClientConfig {
    ClientConfig {
        send_interval: Duration::from_millis(5),
        ..ClientConfig::default()
    }
}

pub fn demo_scene() -> LoadSceneResponse {
    LoadSceneResponse {
        key: "workspaces/demo:abc123".into(),
        agents: vec![AgentInfo {
            agent_id: AgentId::from("agent-1"),
            brain_name: "workspaces/demo/characters/ada".into(),
            given_name: "Ada".into(),
        }],
        previous_state: None,
    }
}

/// Client authenticated, scene "demo" loaded and session streaming.
pub async fn streaming_client(config: ClientConfig) -> (Client, MemoryPeer) {
    let (client, peer) = Client::in_memory(config);
    peer.script_scene_response(demo_scene());
    client.authenticate("session-token").await.unwrap();
    client.load_scene("demo").await.unwrap();
    client.start_session().await.unwrap();
    (client, peer)
}

/// Polls `probe` until it yields a value or `WAIT` elapses.
pub async fn eventually<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {WAIT:?}"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Waits for the next notification with `status`, skipping others.
pub async fn next_event(
    rx: &mut broadcast::Receiver<RuntimeEvent>,
    status: RuntimeStatus,
) -> RuntimeEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.status == status => return event,
                Ok(_) => continue,
                Err(e) => panic!("notification channel failed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {status} notification within {WAIT:?}"))
}
