//! Thread Registry
//!
//! In-memory map of thread id to per-thread read/unread bookkeeping.
//! Applying inbound messages is idempotent: every thread remembers a bounded
//! window of recently-seen message ids and ignores repeats.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::types::{InboundMessage, MessageId, ThreadId};

/// Result of applying one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The message id was already applied to this thread
    Duplicate,
}

/// Bounded recently-seen set, evicted oldest-first.
#[derive(Debug, Clone)]
struct SeenWindow {
    ids: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    capacity: usize,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if the id was already present.
    fn insert(&mut self, id: &MessageId) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id.clone());
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// State of one conversation thread.
#[derive(Debug, Clone)]
pub struct Thread {
    id: ThreadId,
    last_message_at: DateTime<Utc>,
    last_read_at: DateTime<Utc>,
    received: u64,
    /// `sent_at` of every applied message newer than `last_read_at`, ascending
    unread: VecDeque<DateTime<Utc>>,
    seen: SeenWindow,
}

impl Thread {
    fn new(id: ThreadId, dedup_capacity: usize) -> Self {
        Self {
            id,
            last_message_at: DateTime::<Utc>::UNIX_EPOCH,
            last_read_at: DateTime::<Utc>::UNIX_EPOCH,
            received: 0,
            unread: VecDeque::new(),
            seen: SeenWindow::new(dedup_capacity),
        }
    }

    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    pub fn last_message_at(&self) -> DateTime<Utc> {
        self.last_message_at
    }

    pub fn last_read_at(&self) -> DateTime<Utc> {
        self.last_read_at
    }

    pub fn unread_count(&self) -> u64 {
        self.unread.len() as u64
    }

    /// Distinct messages applied since the thread was created
    pub fn received_count(&self) -> u64 {
        self.received
    }

    fn apply(&mut self, message: &InboundMessage) -> ApplyOutcome {
        if !self.seen.insert(&message.message_id) {
            return ApplyOutcome::Duplicate;
        }
        self.received += 1;
        if message.sent_at > self.last_message_at {
            self.last_message_at = message.sent_at;
        }
        if message.sent_at > self.last_read_at {
            // Per-thread delivery is ordered, so this is almost always a push_back
            match self.unread.back() {
                Some(newest) if *newest > message.sent_at => {
                    let at = self.unread.partition_point(|t| *t <= message.sent_at);
                    self.unread.insert(at, message.sent_at);
                }
                _ => self.unread.push_back(message.sent_at),
            }
        }
        ApplyOutcome::Applied
    }

    /// Moves the read marker forward, never backward and never past the
    /// newest known message. Returns true if the marker moved.
    fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        let target = at.min(self.last_message_at);
        if target <= self.last_read_at {
            return false;
        }
        self.last_read_at = target;
        while self.unread.front().is_some_and(|t| *t <= target) {
            self.unread.pop_front();
        }
        true
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            id: self.id.clone(),
            last_message_at: self.last_message_at,
            last_read_at: self.last_read_at,
            unread_count: self.unread_count(),
            received_count: self.received,
        }
    }
}

/// Immutable view of a thread handed to consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    pub last_message_at: DateTime<Utc>,
    pub last_read_at: DateTime<Utc>,
    pub unread_count: u64,
    pub received_count: u64,
}

/// All threads known during the current session.
#[derive(Debug, Clone)]
pub struct ThreadRegistry {
    threads: HashMap<ThreadId, Thread>,
    dedup_capacity: usize,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new(crate::config::RegistryConfig::default().dedup_capacity)
    }
}

impl ThreadRegistry {
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            threads: HashMap::new(),
            dedup_capacity,
        }
    }

    /// Look up or lazily create the thread, then apply the message once.
    pub fn apply_inbound(&mut self, message: &InboundMessage) -> ApplyOutcome {
        let capacity = self.dedup_capacity;
        let thread = self
            .threads
            .entry(message.thread_id.clone())
            .or_insert_with(|| {
                debug!(thread = %message.thread_id, "creating thread on first message");
                Thread::new(message.thread_id.clone(), capacity)
            });
        let outcome = thread.apply(message);
        if outcome == ApplyOutcome::Duplicate {
            debug!(
                thread = %message.thread_id,
                message = %message.message_id,
                "ignoring duplicate message"
            );
        }
        outcome
    }

    /// Create an empty thread if it does not exist. Returns true if created.
    pub fn ensure(&mut self, id: &ThreadId) -> bool {
        if self.threads.contains_key(id) {
            return false;
        }
        self.threads
            .insert(id.clone(), Thread::new(id.clone(), self.dedup_capacity));
        true
    }

    /// Advance the read marker. `None` if the thread is unknown,
    /// otherwise whether the marker moved.
    pub fn mark_read(&mut self, id: &ThreadId, at: DateTime<Utc>) -> Option<bool> {
        self.threads.get_mut(id).map(|thread| thread.mark_read(at))
    }

    pub fn get_thread(&self, id: &ThreadId) -> Option<ThreadSnapshot> {
        self.threads.get(id).map(Thread::snapshot)
    }

    pub fn contains(&self, id: &ThreadId) -> bool {
        self.threads.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    /// Snapshots ordered newest activity first, ties broken by id.
    pub fn snapshots(&self) -> Vec<ThreadSnapshot> {
        let mut out: Vec<ThreadSnapshot> = self.threads.values().map(Thread::snapshot).collect();
        out.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    #[cfg(test)]
    fn seen_len(&self, id: &ThreadId) -> usize {
        self.threads.get(id).map(|t| t.seen.len()).unwrap_or(0)
    }
}
