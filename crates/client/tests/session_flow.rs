mod common;

use std::time::Duration;

use persona_client::{
    Client, ClientConfig, ClientError, OverflowPolicy, QueueConfig, QueueSettings, TransportError,
};
use persona_domain::{
    AnimationChunk, AudioChunk, ControlAction, Packet, PacketKind, PacketPayload, Routing,
    RuntimeStatus, SessionState, SourceType, StateChunk, TextEvent,
};
use persona_shared::{LoadSceneResponse, PreviousState, WireFrame};

use common::{demo_scene, eventually, fast_config, next_event, streaming_client, WAIT};

fn agent_text(text: &str) -> Packet {
    Packet::new(
        Routing::agent_to_player("agent-1"),
        PacketPayload::Text(TextEvent {
            text: text.to_string(),
            source_type: SourceType::Generated,
            is_final: true,
        }),
    )
}

fn text_of(packet: &Packet) -> String {
    packet.as_text().map(|t| t.text.clone()).unwrap_or_default()
}

#[tokio::test]
async fn test_full_session_scenario() {
    let (client, peer) = Client::in_memory(fast_config());
    peer.script_scene_response(demo_scene());
    let mut rx = client.subscribe();

    client.authenticate("session-token").await.unwrap();
    assert!(client.is_authenticated());

    let loaded = client.load_scene("demo").await.unwrap();
    assert_eq!(loaded.session_key.as_str(), "abc123");
    assert_eq!(loaded.agents[0].given_name, "Ada");
    assert!(client.is_session_initialized());

    client.start_session().await.unwrap();
    assert_eq!(client.state(), SessionState::Streaming);
    assert!(client.session_started());

    let hi = agent_text("hi");
    assert!(peer.push_packet(&hi));

    let received = eventually(|| client.try_get_incoming_event()).await;
    assert!(received.same_packet(&hi));
    assert_eq!(text_of(&received), "hi");
    assert!(client.try_get_incoming_event().is_none());

    client.end_session().await;

    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.session_started());
    assert!(!client.is_session_initialized());
    assert!(client.try_get_incoming_event().is_none());
    assert!(client.try_get_audio_chunk().is_none());
    assert!(client.try_get_animation_chunk().is_none());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let statuses: Vec<RuntimeStatus> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            RuntimeStatus::InitSuccess,
            RuntimeStatus::LoadSceneComplete,
            RuntimeStatus::SessionStarted,
            RuntimeStatus::SessionClosed,
        ]
    );
    assert_eq!(events[3].message, "", "graceful close carries no message");
}

#[tokio::test]
async fn test_stream_headers_carry_token_and_session_key() {
    let (client, peer) = streaming_client(fast_config()).await;

    let headers = peer.stream_headers();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].session_id, "abc123");
    let token = client.access_token().unwrap();
    assert_eq!(headers[0].authorization, format!("Bearer {}", token.token));

    client.end_session().await;
}

#[tokio::test]
async fn test_load_scene_failure_is_reported() {
    let (client, peer) = Client::in_memory(fast_config());
    peer.script_scene_failure(TransportError::fault("unreachable"));
    client.authenticate("session-token").await.unwrap();
    let mut rx = client.subscribe();

    let err = client.load_scene("demo").await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert!(!client.is_session_initialized());
    assert_eq!(client.state(), SessionState::Authenticated);
    let event = next_event(&mut rx, RuntimeStatus::LoadSceneFailed).await;
    assert!(event.message.contains("unreachable"));

    let err = client.start_session().await.unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(peer.streams_opened(), 0);
}

#[tokio::test]
async fn test_state_chunk_updates_last_state_without_queueing() {
    let (client, peer) = streaming_client(fast_config()).await;
    let snapshot = StateChunk {
        data: b"snapshot-1".to_vec(),
    };

    peer.push_packet(&Packet::new(
        Routing::agent_to_player("agent-1"),
        PacketPayload::State(snapshot.clone()),
    ));
    peer.push_packet(&agent_text("after"));

    // Frames are routed in arrival order, so the marker proves the state was handled.
    let marker = eventually(|| client.try_get_incoming_event()).await;
    assert_eq!(text_of(&marker), "after");
    assert!(client.try_get_incoming_event().is_none());
    assert_eq!(client.last_state(), Some(snapshot.to_base64()));
    assert_eq!(client.metrics().state_updates, 1);

    client.end_session().await;
    assert_eq!(
        client.last_state(),
        Some(snapshot.to_base64()),
        "snapshot survives the session"
    );
}

#[tokio::test]
async fn test_next_scene_load_continues_from_last_state() {
    let (client, peer) = streaming_client(fast_config()).await;
    let snapshot = StateChunk {
        data: vec![1, 2, 3],
    };
    peer.push_packet(&Packet::new(
        Routing::agent_to_player("agent-1"),
        PacketPayload::State(snapshot.clone()),
    ));
    eventually(|| client.last_state()).await;
    client.end_session().await;

    peer.script_scene_response(LoadSceneResponse {
        previous_state: Some(PreviousState {
            packets: vec![
                WireFrame::from(&Packet::text(Routing::player_to_agent("agent-1"), "hello")),
                WireFrame::from(&Packet::audio(Routing::agent_to_player("agent-1"), vec![0])),
                WireFrame::from(&agent_text("welcome back")),
            ],
        }),
        ..demo_scene()
    });

    let loaded = client.load_scene("demo").await.unwrap();

    let requests = peer.scene_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].previous_state, None);
    assert_eq!(requests[1].previous_state, Some(snapshot.to_base64()));

    let summary: Vec<&str> = loaded
        .previous_state_summary
        .iter()
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(summary, vec!["hello", "welcome back"]);
}

#[tokio::test]
async fn test_outgoing_frames_are_sent_in_fifo_order() {
    let (client, peer) = streaming_client(fast_config()).await;

    for i in 0..5 {
        client.send_text("agent-1", &format!("line {i}")).unwrap();
    }

    assert!(peer.wait_for_sent(5, WAIT).await);
    let sent: Vec<String> = peer.sent_packets().iter().map(text_of).collect();
    assert_eq!(sent, vec!["line 0", "line 1", "line 2", "line 3", "line 4"]);
    assert!(peer
        .sent_packets()
        .iter()
        .all(|p| p.routing == Routing::player_to_agent("agent-1")));
    assert_eq!(client.metrics().frames_sent, 5);

    client.end_session().await;
}

#[tokio::test]
async fn test_ending_with_queued_frames_abandons_them() {
    let config = ClientConfig {
        send_interval: Duration::from_secs(60),
        ..ClientConfig::default()
    };
    let (client, peer) = streaming_client(config).await;

    for i in 0..3 {
        client.send_text("agent-1", &format!("pending {i}")).unwrap();
    }
    assert_eq!(client.queue_stats().unwrap().outgoing.len, 3);

    client.end_session().await;

    assert_eq!(peer.sent_count(), 0);
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.take_errors().is_empty());
    assert!(client.queue_stats().is_none());
    assert_eq!(peer.sends_completed(), 1);
    assert_eq!(peer.streams_disposed(), 1);
}

#[tokio::test]
async fn test_read_fault_closes_session_and_engine_is_reusable() {
    let (client, peer) = streaming_client(fast_config()).await;
    let mut rx = client.subscribe();

    peer.push_fault("connection reset by peer");

    let closed = next_event(&mut rx, RuntimeStatus::SessionClosed).await;
    assert!(closed.message.contains("connection reset by peer"));
    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.session_started());

    let errors = client.take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("connection reset by peer"));

    // end_session after a fault has nothing left to do
    client.end_session().await;

    client.load_scene("demo").await.unwrap();
    client.start_session().await.unwrap();
    assert_eq!(client.state(), SessionState::Streaming);
    assert_eq!(peer.streams_opened(), 2);
    client.end_session().await;
}

#[tokio::test]
async fn test_write_fault_closes_session() {
    let (client, peer) = streaming_client(fast_config()).await;
    let mut rx = client.subscribe();
    peer.fail_writes("broken pipe");

    client.send_text("agent-1", "hello?").unwrap();

    let closed = next_event(&mut rx, RuntimeStatus::SessionClosed).await;
    assert!(closed.message.contains("broken pipe"));
    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.take_errors().is_empty());
}

#[tokio::test]
async fn test_server_ending_stream_is_graceful() {
    let (client, peer) = streaming_client(fast_config()).await;
    let mut rx = client.subscribe();

    peer.end_stream();

    let closed = next_event(&mut rx, RuntimeStatus::SessionClosed).await;
    assert_eq!(closed.message, "");
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.take_errors().is_empty());
}

#[tokio::test]
async fn test_stream_cancellation_is_graceful() {
    let (client, peer) = streaming_client(fast_config()).await;
    let mut rx = client.subscribe();

    peer.cancel_stream();

    let closed = next_event(&mut rx, RuntimeStatus::SessionClosed).await;
    assert_eq!(closed.message, "");
    assert!(client.take_errors().is_empty());
}

#[tokio::test]
async fn test_failed_stream_open_closes_session() {
    let (client, peer) = Client::in_memory(fast_config());
    peer.script_scene_response(demo_scene());
    peer.fail_next_open(TransportError::fault("handshake refused"));
    client.authenticate("session-token").await.unwrap();
    client.load_scene("demo").await.unwrap();

    let err = client.start_session().await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.is_session_initialized());
    assert_eq!(client.take_errors().len(), 1);
}

#[tokio::test]
async fn test_concurrent_start_session_is_rejected() {
    let (client, peer) = Client::in_memory(fast_config());
    peer.script_scene_response(demo_scene());
    client.authenticate("session-token").await.unwrap();
    client.load_scene("demo").await.unwrap();

    let (first, second) = tokio::join!(client.start_session(), client.start_session());

    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    let refused = first.err().or(second.err()).unwrap();
    assert!(refused.is_precondition());
    assert_eq!(peer.streams_opened(), 1);

    client.end_session().await;
}

#[tokio::test]
async fn test_start_after_close_requires_new_scene_load() {
    let (client, _peer) = streaming_client(fast_config()).await;
    client.end_session().await;

    let err = client.start_session().await.unwrap_err();
    assert_eq!(
        err,
        ClientError::precondition("start a session", SessionState::Closed)
    );
}

#[tokio::test]
async fn test_unrecognized_frames_are_counted_not_fatal() {
    let (client, peer) = streaming_client(fast_config()).await;

    peer.push_raw(r#"{"event": {"type": "hologram"}}"#);
    peer.push_raw(r#"{"event": {"type": "data_chunk", "chunk_type": "smell", "data": ""}}"#);
    peer.push_raw("{truncated");
    peer.push_packet(&agent_text("still here"));

    let packet = eventually(|| client.try_get_incoming_event()).await;
    assert_eq!(text_of(&packet), "still here");

    let metrics = client.metrics();
    assert_eq!(metrics.unrecognized_frames, 3);
    assert_eq!(metrics.frames_received, 4);
    assert_eq!(client.state(), SessionState::Streaming);
    assert!(client.take_errors().is_empty());

    client.end_session().await;
}

#[tokio::test]
async fn test_media_chunks_land_in_their_own_queues() {
    let (client, peer) = streaming_client(fast_config()).await;
    let routing = Routing::agent_to_player("agent-1");

    peer.push_packet(&Packet::audio(routing.clone(), vec![1, 2, 3]));
    peer.push_packet(&Packet::new(
        routing.clone(),
        PacketPayload::Animation(AnimationChunk { chunk: vec![7] }),
    ));
    peer.push_packet(&Packet::control(routing, ControlAction::InteractionEnd));

    let audio = eventually(|| client.try_get_audio_chunk()).await;
    assert_eq!(
        audio.payload,
        PacketPayload::Audio(AudioChunk {
            chunk: vec![1, 2, 3]
        })
    );
    let animation = eventually(|| client.try_get_animation_chunk()).await;
    assert_eq!(animation.kind(), PacketKind::Animation);
    let control = eventually(|| client.try_get_incoming_event()).await;
    assert_eq!(control.kind(), PacketKind::Control);

    assert!(client.try_get_audio_chunk().is_none());
    assert!(client.try_get_animation_chunk().is_none());
    assert!(client.try_get_incoming_event().is_none());

    client.end_session().await;
}

#[tokio::test]
async fn test_audio_session_controls_are_sent() {
    let (client, peer) = streaming_client(fast_config()).await;
    let routing = Routing::player_to_agent("agent-1");

    client.start_audio(routing.clone()).unwrap();
    client.send_audio(routing.clone(), vec![0; 32]).unwrap();
    client.end_audio(routing.clone()).unwrap();

    assert!(peer.wait_for_sent(3, WAIT).await);
    let sent = peer.sent_packets();
    let control_action = |packet: &Packet| match &packet.payload {
        PacketPayload::Control(control) => Some(control.action),
        _ => None,
    };
    assert_eq!(control_action(&sent[0]), Some(ControlAction::AudioSessionStart));
    assert_eq!(sent[1].kind(), PacketKind::Audio);
    assert_eq!(control_action(&sent[2]), Some(ControlAction::AudioSessionEnd));
    assert!(sent.iter().all(|p| p.routing == routing));

    client.end_session().await;
}

#[tokio::test]
async fn test_outgoing_reject_policy_surfaces_queue_full() {
    let config = ClientConfig {
        send_interval: Duration::from_secs(60),
        queues: QueueConfig {
            outgoing: QueueSettings::new(2, OverflowPolicy::Reject),
            ..QueueConfig::default()
        },
        ..ClientConfig::default()
    };
    let (client, _peer) = streaming_client(config).await;

    client.send_text("agent-1", "one").unwrap();
    client.send_text("agent-1", "two").unwrap();
    let err = client.send_text("agent-1", "three").unwrap_err();

    assert_eq!(err, ClientError::QueueFull { capacity: 2 });
    let stats = client.queue_stats().unwrap().outgoing;
    assert_eq!(stats.len, 2);
    assert_eq!(stats.dropped, 1);

    client.end_session().await;
}

#[tokio::test]
async fn test_incoming_drop_oldest_policy_evicts_and_counts() {
    let config = ClientConfig {
        queues: QueueConfig {
            interaction: QueueSettings::new(2, OverflowPolicy::DropOldest),
            ..QueueConfig::default()
        },
        ..fast_config()
    };
    let (client, peer) = streaming_client(config).await;

    for text in ["first", "second", "third"] {
        peer.push_packet(&agent_text(text));
    }

    eventually(|| {
        client
            .queue_stats()
            .filter(|stats| stats.interaction.dropped == 1)
    })
    .await;

    let kept: Vec<String> = std::iter::from_fn(|| client.try_get_incoming_event())
        .map(|p| text_of(&p))
        .collect();
    assert_eq!(kept, vec!["second", "third"]);

    client.end_session().await;
}

#[tokio::test]
async fn test_destroy_resets_everything() {
    let (client, peer) = streaming_client(fast_config()).await;
    let mut rx = client.subscribe();

    client.destroy().await;

    next_event(&mut rx, RuntimeStatus::SessionClosed).await;
    assert_eq!(client.state(), SessionState::Idle);
    assert!(!client.is_authenticated());
    assert!(client.session_key().is_none());
    assert!(peer.is_shut_down());
    assert!(!peer.has_open_stream());

    // A destroyed client starts over from authentication.
    let err = client.load_scene("demo").await.unwrap_err();
    assert!(err.is_precondition());
}
