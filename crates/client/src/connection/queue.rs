//! Bounded FIFO shared between the stream tasks and the host.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::config::{OverflowPolicy, QueueSettings};

/// Result of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The queue was full and its oldest item was evicted to make room.
    EvictedOldest,
}

/// Returned when a [`OverflowPolicy::Reject`] queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

/// Mutex-guarded ring with a hard capacity. Every operation holds the lock
/// only for the duration of a `VecDeque` call, so pushes and polls never wait
/// on I/O.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    settings: QueueSettings,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub fn new(settings: QueueSettings) -> Self {
        let settings = QueueSettings {
            capacity: settings.capacity.max(1),
            ..settings
        };
        Self {
            items: Mutex::new(VecDeque::with_capacity(settings.capacity.min(64))),
            settings,
            dropped: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the deque half-modified,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, item: T) -> Result<PushOutcome, Full> {
        let mut items = self.lock();
        if items.len() < self.settings.capacity {
            items.push_back(item);
            return Ok(PushOutcome::Accepted);
        }

        match self.settings.policy {
            OverflowPolicy::Reject => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(Full)
            }
            OverflowPolicy::DropOldest => {
                items.pop_front();
                items.push_back(item);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(PushOutcome::EvictedOldest)
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Removes and returns everything queued right now, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.settings.policy
    }

    /// Items evicted or refused since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
