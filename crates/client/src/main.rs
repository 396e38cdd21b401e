//! Persona Client - terminal runner.
//!
//! Authenticates, loads `PERSONA_SCENE`, opens a session and chats with the
//! first character in the scene: each stdin line is sent as a text event,
//! incoming events are printed. EOF or Ctrl-C ends the session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use persona_client::infrastructure::{HttpAuthProvider, StaticSceneConfig, WebSocketTransport};
use persona_client::{Client, ClientConfig};
use persona_domain::{ActorKind, Packet, PacketPayload};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "persona_client=debug,persona_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    let session_token =
        std::env::var("PERSONA_SESSION_TOKEN").context("PERSONA_SESSION_TOKEN must be set")?;
    let scene = std::env::var("PERSONA_SCENE").context("PERSONA_SCENE must be set")?;

    tracing::info!(server = %config.server_url, stream = %config.stream_url, "Starting Persona client");

    let client = Client::new(
        config.clone(),
        Arc::new(HttpAuthProvider::from_config(&config)),
        Arc::new(StaticSceneConfig::from_config(&config)),
        Arc::new(WebSocketTransport::from_config(&config)),
    );

    let mut events = client.subscribe();
    let notifications = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.message.is_empty() => println!("* {}", event.status),
                Ok(event) => println!("* {}: {}", event.status, event.message),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Notification receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.authenticate(&session_token).await?;
    let loaded = client.load_scene(&scene).await?;
    for earlier in &loaded.previous_state_summary {
        println!("(earlier) {}", earlier.text);
    }

    let agent = loaded
        .agents
        .first()
        .context("scene has no characters")?;
    let agent_id = agent.agent_id.clone();
    println!("Talking to {} ({})", agent.given_name, agent_id);

    client.start_session().await?;
    let poller = tokio::spawn(print_incoming(client.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = client.send_text(agent_id.as_str(), text) {
                    tracing::warn!(error = %e, "Message not sent");
                }
            }
        }

        if !client.session_started() {
            tracing::info!("Session is no longer streaming");
            break;
        }
    }

    client.end_session().await;
    poller.abort();

    for fault in client.take_errors() {
        eprintln!("error at {}: {}", fault.occurred_at, fault.message);
    }
    if let Some(state) = client.last_state() {
        tracing::debug!(bytes = state.len(), "Session snapshot available for continuation");
    }

    client.destroy().await;
    notifications.abort();
    Ok(())
}

async fn print_incoming(client: Client) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;

        while let Some(packet) = client.try_get_incoming_event() {
            print_packet(&packet);
        }
        // Audio and animation playback belong to a real host; drain them here.
        while client.try_get_audio_chunk().is_some() {}
        while client.try_get_animation_chunk().is_some() {}
    }
}

fn print_packet(packet: &Packet) {
    let speaker = match packet.routing.source.kind {
        ActorKind::Agent => packet.routing.source.name.as_str(),
        ActorKind::Player => "you",
        ActorKind::Unknown => "?",
    };

    match &packet.payload {
        PacketPayload::Text(text) if text.is_final => println!("{speaker}: {}", text.text),
        PacketPayload::Emotion(emotion) => {
            println!("  [{speaker} feels {:?} ({:?})]", emotion.behavior, emotion.strength)
        }
        PacketPayload::Gesture(gesture) => println!("  [{speaker} {}]", gesture.gesture),
        PacketPayload::Custom(custom) => println!("  [trigger {}]", custom.name),
        other => tracing::trace!(kind = %other.kind(), "Unprinted event"),
    }
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
    let _ = dotenvy::dotenv();
}
