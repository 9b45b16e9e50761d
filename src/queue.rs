//! Bounded FIFO queue between the collection and delivery tasks.
//!
//! The queue is a `VecDeque` behind a mutex plus two [`Notify`] signals (not-empty and
//! not-full). The mutex is only held for the push/pop itself, never across an `.await`.
//! When the queue is full, behavior follows the configured [`OverflowPolicy`].

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;

use crate::reading::Reading;

/// Default maximum queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// What `push` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the consumer frees a slot (backpressure on the producer)
    #[default]
    Block,

    /// Evict the oldest queued reading to make room
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_oldest" | "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!(
                "'{}' is not a valid overflow policy (expected 'block' or 'drop_oldest')",
                other
            )),
        }
    }
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "block"),
            OverflowPolicy::DropOldest => write!(f, "drop_oldest"),
        }
    }
}

/// Errors from the non-blocking queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Nothing to dequeue
    #[error("Queue is empty")]
    Empty,

    /// At capacity under the `Block` policy
    #[error("Queue is full")]
    Full,
}

/// Outcome of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The reading was appended
    Enqueued,

    /// The reading was appended after evicting the oldest one
    EvictedOldest,
}

/// Counters describing queue traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Readings accepted by `push`/`try_push`
    pub enqueued: u64,

    /// Readings handed to the consumer
    pub dequeued: u64,

    /// Readings evicted under `DropOldest`
    pub dropped: u64,

    /// Current depth
    pub depth: usize,
}

/// Bounded multi-producer/multi-consumer FIFO of readings.
///
/// The pipeline uses it with one producer (collection) and one consumer (delivery).
pub struct ReadingQueue {
    items: Mutex<VecDeque<Reading>>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
}

impl ReadingQueue {
    /// Create a queue with the given capacity (at least 1) and overflow policy.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a queue with the default capacity and the `Block` policy.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Reading>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a reading.
    ///
    /// Under `Block` this waits while the queue is full; under `DropOldest` it never waits.
    pub async fn push(&self, reading: Reading) -> PushOutcome {
        let mut reading = reading;
        loop {
            let slot_freed = self.not_full.notified();

            match self.offer(reading) {
                Ok(outcome) => return outcome,
                Err(returned) => reading = returned,
            }

            slot_freed.await;
        }
    }

    /// Append a reading without waiting.
    ///
    /// Fails with `Full` only under the `Block` policy.
    pub fn try_push(&self, reading: Reading) -> Result<PushOutcome, QueueError> {
        self.offer(reading).map_err(|_| QueueError::Full)
    }

    /// Insert if possible; hands the reading back when the producer has to wait.
    fn offer(&self, reading: Reading) -> Result<PushOutcome, Reading> {
        let outcome = {
            let mut items = self.items();

            if items.len() < self.capacity {
                items.push_back(reading);
                PushOutcome::Enqueued
            } else {
                match self.policy {
                    OverflowPolicy::Block => return Err(reading),
                    OverflowPolicy::DropOldest => {
                        if let Some(evicted) = items.pop_front() {
                            warn!(
                                dev_id = evicted.mcu_dev_id,
                                sensor = %evicted.sensor_name,
                                capacity = self.capacity,
                                "Queue overflow: dropping oldest reading"
                            );
                        }
                        items.push_back(reading);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::EvictedOldest
                    }
                }
            }
        };

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(outcome)
    }

    /// Remove the oldest reading, waiting until one is available.
    pub async fn pop(&self) -> Reading {
        loop {
            let item_added = self.not_empty.notified();

            if let Ok(reading) = self.try_pop() {
                return reading;
            }

            item_added.await;
        }
    }

    /// Remove the oldest reading without waiting.
    pub fn try_pop(&self) -> Result<Reading, QueueError> {
        let next = self.items().pop_front();

        match next {
            Some(reading) => {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                self.not_full.notify_one();
                Ok(reading)
            }
            None => Err(QueueError::Empty),
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Snapshot of the queue counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            depth: self.len(),
        }
    }
}

impl Default for ReadingQueue {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ReadingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("depth", &self.len())
            .finish()
    }
}
