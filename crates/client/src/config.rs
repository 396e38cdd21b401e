//! Client configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default HTTP base for auth and scene load.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Path of the streaming endpoint relative to the server host.
pub const STREAM_PATH: &str = "/v1/session/stream";

pub const DEFAULT_SEND_INTERVAL_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// What a bounded queue does when an item arrives while it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest item and accept the new one.
    DropOldest,
    /// Refuse the new item.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub capacity: usize,
    pub policy: OverflowPolicy,
}

impl QueueSettings {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self { capacity, policy }
    }
}

/// Capacity and overflow policy for each of the four session queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub audio: QueueSettings,
    pub animation: QueueSettings,
    pub interaction: QueueSettings,
    pub outgoing: QueueSettings,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            audio: QueueSettings::new(512, OverflowPolicy::DropOldest),
            animation: QueueSettings::new(512, OverflowPolicy::DropOldest),
            interaction: QueueSettings::new(1024, OverflowPolicy::DropOldest),
            outgoing: QueueSettings::new(1024, OverflowPolicy::Reject),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub stream_url: String,
    /// Coalescing delay between writer drains.
    pub send_interval: Duration,
    pub request_timeout: Duration,
    pub queues: QueueConfig,
    pub user_name: String,
    pub user_id: String,
    pub client_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_server_url(DEFAULT_SERVER_URL)
    }
}

impl ClientConfig {
    /// Defaults for everything except the server, with the stream URL derived from it.
    pub fn with_server_url(server_url: &str) -> Self {
        let server_url = server_url.trim_end_matches('/').to_string();
        Self {
            stream_url: derive_stream_url(&server_url),
            server_url,
            send_interval: Duration::from_millis(DEFAULT_SEND_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            queues: QueueConfig::default(),
            user_name: "Player".to_string(),
            user_id: String::new(),
            client_id: "persona-rs".to_string(),
        }
    }

    /// Create config from `PERSONA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let server_url = lookup("PERSONA_SERVER_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let mut config = Self::with_server_url(&server_url);

        if let Some(stream_url) = lookup("PERSONA_STREAM_URL").filter(|v| !v.trim().is_empty()) {
            config.stream_url = stream_url;
        }

        config.send_interval = Duration::from_millis(parse_or_default(
            &lookup,
            "PERSONA_SEND_INTERVAL_MS",
            DEFAULT_SEND_INTERVAL_MS,
        ));
        config.request_timeout = Duration::from_secs(parse_or_default(
            &lookup,
            "PERSONA_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));

        let defaults = QueueConfig::default();
        config.queues.audio.capacity =
            parse_capacity(&lookup, "PERSONA_AUDIO_QUEUE_CAPACITY", defaults.audio.capacity);
        config.queues.animation.capacity = parse_capacity(
            &lookup,
            "PERSONA_ANIMATION_QUEUE_CAPACITY",
            defaults.animation.capacity,
        );
        config.queues.interaction.capacity = parse_capacity(
            &lookup,
            "PERSONA_INTERACTION_QUEUE_CAPACITY",
            defaults.interaction.capacity,
        );
        config.queues.outgoing.capacity = parse_capacity(
            &lookup,
            "PERSONA_OUTGOING_QUEUE_CAPACITY",
            defaults.outgoing.capacity,
        );

        if let Some(name) = lookup("PERSONA_USER_NAME") {
            config.user_name = name;
        }
        if let Some(id) = lookup("PERSONA_USER_ID") {
            config.user_id = id;
        }
        if let Some(id) = lookup("PERSONA_CLIENT_ID") {
            config.client_id = id;
        }

        config
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
    }
}

fn parse_capacity(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    match parse_or_default(lookup, key, default) {
        0 => {
            tracing::warn!(key, default, "Queue capacity must be positive, using default");
            default
        }
        n => n,
    }
}

/// `http(s)://host[:port]/...` becomes `ws(s)://host[:port]/v1/session/stream`.
pub fn derive_stream_url(server_url: &str) -> String {
    match url::Url::parse(server_url) {
        Ok(mut url) => {
            let scheme = match url.scheme() {
                "https" | "wss" => "wss",
                _ => "ws",
            };
            if url.set_scheme(scheme).is_err() {
                tracing::warn!(server_url, "Cannot derive stream scheme from server URL");
            }
            url.set_path(STREAM_PATH);
            url.set_query(None);
            url.to_string()
        }
        Err(e) => {
            tracing::warn!(server_url, error = %e, "Invalid server URL, using it verbatim");
            format!("{}{}", server_url.trim_end_matches('/'), STREAM_PATH)
        }
    }
}
