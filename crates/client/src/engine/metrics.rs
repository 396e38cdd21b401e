//! Session counters and the fault log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative counters for the lifetime of an engine.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    unrecognized_frames: AtomicU64,
    state_updates: AtomicU64,
    sessions_started: AtomicU64,
}

impl SessionMetrics {
    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrecognized(&self) {
        self.unrecognized_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_update(&self) {
        self.state_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            unrecognized_frames: self.unrecognized_frames.load(Ordering::Relaxed),
            state_updates: self.state_updates.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_sent: u64,
    /// Frames that parsed but matched no packet variant, or did not parse at all.
    pub unrecognized_frames: u64,
    pub state_updates: u64,
    pub sessions_started: u64,
}

/// A failure captured from a stream task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFault {
    pub occurred_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct FaultLog {
    faults: Mutex<Vec<SessionFault>>,
}

impl FaultLog {
    pub fn record(&self, message: impl Into<String>) {
        let fault = SessionFault {
            occurred_at: Utc::now(),
            message: message.into(),
        };
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(fault);
    }

    /// Returns and clears everything recorded so far.
    pub fn take(&self) -> Vec<SessionFault> {
        std::mem::take(
            &mut *self
                .faults
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = SessionMetrics::default();
        metrics.record_received();
        metrics.record_received();
        metrics.record_unrecognized();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.unrecognized_frames, 1);
        assert_eq!(snapshot.frames_sent, 0);
    }

    #[test]
    fn test_fault_log_take_clears() {
        let log = FaultLog::default();
        log.record("boom");
        let faults = log.take();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].message, "boom");
        assert!(log.take().is_empty());
    }
}
