//! Per-session connection state.
//!
//! A [`ConnectionState`] owns the four queues that decouple the stream tasks
//! from the host: three incoming queues filled by the reader task and drained
//! by host polling, and one outgoing queue filled by the host and drained by
//! the writer task. A fresh instance is created for every session and dropped
//! when the session ends, so nothing leaks from one session into the next.

mod queue;

pub use queue::{BoundedQueue, Full, PushOutcome};

use persona_domain::Packet;
use serde::Serialize;

use crate::config::{OverflowPolicy, QueueConfig};
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Audio,
    Animation,
    Interaction,
    Outgoing,
}

impl QueueKind {
    pub const ALL: [QueueKind; 4] = [
        QueueKind::Audio,
        QueueKind::Animation,
        QueueKind::Interaction,
        QueueKind::Outgoing,
    ];
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Animation => write!(f, "animation"),
            Self::Interaction => write!(f, "interaction"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub kind: QueueKind,
    pub len: usize,
    pub capacity: usize,
    pub policy: OverflowPolicy,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub audio: QueueStats,
    pub animation: QueueStats,
    pub interaction: QueueStats,
    pub outgoing: QueueStats,
}

impl ConnectionStats {
    pub fn get(&self, kind: QueueKind) -> QueueStats {
        match kind {
            QueueKind::Audio => self.audio,
            QueueKind::Animation => self.animation,
            QueueKind::Interaction => self.interaction,
            QueueKind::Outgoing => self.outgoing,
        }
    }
}

pub struct ConnectionState {
    audio: BoundedQueue<Packet>,
    animation: BoundedQueue<Packet>,
    interaction: BoundedQueue<Packet>,
    outgoing: BoundedQueue<Packet>,
}

impl ConnectionState {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            audio: BoundedQueue::new(config.audio),
            animation: BoundedQueue::new(config.animation),
            interaction: BoundedQueue::new(config.interaction),
            outgoing: BoundedQueue::new(config.outgoing),
        }
    }

    fn queue(&self, kind: QueueKind) -> &BoundedQueue<Packet> {
        match kind {
            QueueKind::Audio => &self.audio,
            QueueKind::Animation => &self.animation,
            QueueKind::Interaction => &self.interaction,
            QueueKind::Outgoing => &self.outgoing,
        }
    }

    fn push(&self, kind: QueueKind, packet: Packet) -> Result<(), QueueError> {
        let queue = self.queue(kind);
        match queue.push(packet) {
            Ok(PushOutcome::Accepted) => Ok(()),
            Ok(PushOutcome::EvictedOldest) => {
                tracing::warn!(
                    queue = %kind,
                    capacity = queue.capacity(),
                    dropped = queue.dropped(),
                    "Queue full, dropped oldest packet"
                );
                Ok(())
            }
            Err(Full) => Err(QueueError::Full {
                kind,
                capacity: queue.capacity(),
            }),
        }
    }

    /// Adds an inbound packet to one of the three incoming queues.
    pub fn enqueue_incoming(&self, kind: QueueKind, packet: Packet) -> Result<(), QueueError> {
        if kind == QueueKind::Outgoing {
            return Err(QueueError::NotIncoming(kind));
        }
        self.push(kind, packet)
    }

    pub fn enqueue_outgoing(&self, packet: Packet) -> Result<(), QueueError> {
        self.push(QueueKind::Outgoing, packet)
    }

    /// Non-blocking poll. An empty queue yields `None`.
    pub fn try_dequeue(&self, kind: QueueKind) -> Option<Packet> {
        self.queue(kind).pop()
    }

    /// Takes every queued outgoing packet in FIFO order.
    pub fn drain_outgoing(&self) -> Vec<Packet> {
        self.outgoing.drain()
    }

    pub fn stats(&self) -> ConnectionStats {
        let stats = |kind| {
            let queue = self.queue(kind);
            QueueStats {
                kind,
                len: queue.len(),
                capacity: queue.capacity(),
                policy: queue.policy(),
                dropped: queue.dropped(),
            }
        };
        ConnectionStats {
            audio: stats(QueueKind::Audio),
            animation: stats(QueueKind::Animation),
            interaction: stats(QueueKind::Interaction),
            outgoing: stats(QueueKind::Outgoing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueSettings;
    use persona_domain::Routing;

    fn text(n: usize) -> Packet {
        Packet::text(Routing::agent_to_player("a"), format!("msg {n}"))
    }

    #[test]
    fn test_empty_poll_returns_none() {
        let connection = ConnectionState::new(&QueueConfig::default());
        for kind in QueueKind::ALL {
            assert!(connection.try_dequeue(kind).is_none());
        }
    }

    #[test]
    fn test_incoming_rejects_outgoing_kind() {
        let connection = ConnectionState::new(&QueueConfig::default());
        assert_eq!(
            connection.enqueue_incoming(QueueKind::Outgoing, text(0)),
            Err(QueueError::NotIncoming(QueueKind::Outgoing))
        );
    }

    #[test]
    fn test_queues_are_independent() {
        let connection = ConnectionState::new(&QueueConfig::default());
        connection
            .enqueue_incoming(QueueKind::Interaction, text(1))
            .unwrap();

        assert!(connection.try_dequeue(QueueKind::Audio).is_none());
        let packet = connection.try_dequeue(QueueKind::Interaction).unwrap();
        assert_eq!(packet.as_text().unwrap().text, "msg 1");
    }

    #[test]
    fn test_outgoing_reject_policy() {
        let config = QueueConfig {
            outgoing: QueueSettings::new(2, OverflowPolicy::Reject),
            ..QueueConfig::default()
        };
        let connection = ConnectionState::new(&config);
        connection.enqueue_outgoing(text(1)).unwrap();
        connection.enqueue_outgoing(text(2)).unwrap();

        let err = connection.enqueue_outgoing(text(3)).unwrap_err();
        assert_eq!(
            err,
            QueueError::Full {
                kind: QueueKind::Outgoing,
                capacity: 2
            }
        );

        let drained: Vec<String> = connection
            .drain_outgoing()
            .iter()
            .map(|p| p.as_text().unwrap().text.clone())
            .collect();
        assert_eq!(drained, vec!["msg 1", "msg 2"]);
        assert_eq!(connection.stats().outgoing.dropped, 1);
    }

    #[test]
    fn test_incoming_drop_oldest_policy() {
        let config = QueueConfig {
            interaction: QueueSettings::new(1, OverflowPolicy::DropOldest),
            ..QueueConfig::default()
        };
        let connection = ConnectionState::new(&config);
        connection
            .enqueue_incoming(QueueKind::Interaction, text(1))
            .unwrap();
        connection
            .enqueue_incoming(QueueKind::Interaction, text(2))
            .unwrap();

        let stats = connection.stats().get(QueueKind::Interaction);
        assert_eq!(stats.len, 1);
        assert_eq!(stats.dropped, 1);
        let kept = connection.try_dequeue(QueueKind::Interaction).unwrap();
        assert_eq!(kept.as_text().unwrap().text, "msg 2");
    }
}
