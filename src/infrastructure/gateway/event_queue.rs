//! Bounded event queue with drop-oldest overflow.
//!
//! The read loop pushes events here and a separate worker drains them into
//! the registered handler. The read loop never calls the handler inline, so
//! a slow handler can never stall socket reads and get the connection kicked
//! for slow-consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::Notify;

/// Queue capacity; an arriving event evicts the oldest once full.
pub const EVENT_QUEUE_CAPACITY: usize = 500;

/// Sequence gaps at or above this size log at error level.
pub const GAP_ERROR_THRESHOLD: u64 = 100;

/// One gateway push event, already unwrapped from its frame.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub event: String,
    pub payload: Option<Value>,
    pub seq: i64,
}

/// Bounded FIFO between the read loop and the dispatch worker.
pub struct EventQueue {
    inner: Mutex<VecDeque<GatewayEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event; evicts the oldest entry when full.
    pub fn push(&self, event: GatewayEvent) {
        {
            let mut queue = self.inner.lock().expect("event queue poisoned");
            if queue.len() == self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Dequeue the next event, waiting if the queue is empty.
    pub async fn pop(&self) -> GatewayEvent {
        loop {
            if let Some(event) = self.inner.lock().expect("event queue poisoned").pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    /// Number of events evicted due to a full queue.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_CAPACITY)
    }
}

/// Outcome of observing one event's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqObservation {
    /// Contiguous with the previous event
    Normal,
    /// `n` events were missed
    Gap(u64),
}

/// Tracks `last_seq` per connection.
///
/// Starts at −1; set to the observed seq on every event; reset to −1 on
/// every successful reconnect.
pub struct SeqTracker {
    last: AtomicI64,
}

impl SeqTracker {
    pub fn new() -> Self {
        Self { last: AtomicI64::new(-1) }
    }

    /// Record an observed sequence number and classify the step.
    pub fn observe(&self, seq: i64) -> SeqObservation {
        let prev = self.last.swap(seq, Ordering::SeqCst);
        if seq > prev + 1 {
            SeqObservation::Gap((seq - prev - 1) as u64)
        } else {
            SeqObservation::Normal
        }
    }

    /// Reset after reconnect; the server restarts its counter at 0.
    pub fn reset(&self) {
        self.last.store(-1, Ordering::SeqCst);
    }

    pub fn last_seq(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}

impl Default for SeqTracker {
    fn default() -> Self {
        Self::new()
    }
}
