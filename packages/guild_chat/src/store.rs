//! Store
//!
//! Single owner of the thread registry and session state. Every accepted
//! intent is applied to completion, the unread total is recomputed once, and
//! a new immutable snapshot is published to every subscriber. Intermediate
//! states are never observable.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::connection::ConnectionStatus;
use crate::error::ChatError;
use crate::intent::Intent;
use crate::listeners::{Listeners, Subscription};
use crate::panel::PanelState;
use crate::snapshot::ChatSnapshot;
use crate::thread::ThreadRegistry;
use crate::types::InboundMessage;
use crate::unread::recompute_total;

/// What a dispatch did to the published state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new snapshot with this version was published
    Published(u64),
    /// Accepted, but nothing observable changed (e.g. a duplicate message)
    Unchanged,
    /// Dropped without touching state (stale catch-up response)
    Discarded,
}

pub struct Store {
    registry: ThreadRegistry,
    panel: PanelState,
    connection_status: ConnectionStatus,
    generation: u64,
    snapshot: Arc<ChatSnapshot>,
    listeners: Arc<Listeners>,
    watch_tx: watch::Sender<Arc<ChatSnapshot>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl Store {
    pub fn new(config: &RegistryConfig) -> Self {
        let snapshot = Arc::new(ChatSnapshot::default());
        let (watch_tx, _) = watch::channel(snapshot.clone());
        Self {
            registry: ThreadRegistry::new(config.dedup_capacity),
            panel: PanelState::default(),
            connection_status: ConnectionStatus::Disconnected,
            generation: 0,
            snapshot,
            listeners: Arc::new(Listeners::default()),
            watch_tx,
        }
    }

    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(Arc<ChatSnapshot>) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    pub fn listeners(&self) -> Arc<Listeners> {
        self.listeners.clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<ChatSnapshot>> {
        self.watch_tx.subscribe()
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dispatch(&mut self, intent: Intent) -> Result<DispatchOutcome, ChatError> {
        self.dispatch_at(intent, Utc::now())
    }

    /// Apply one intent; `now` is used as the read time for selections.
    pub fn dispatch_at(
        &mut self,
        intent: Intent,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, ChatError> {
        if !self.apply(intent, now)? {
            return Ok(DispatchOutcome::Discarded);
        }
        Ok(self.publish())
    }

    /// Apply several intents and publish once.
    ///
    /// A `MarkRead` for a thread that does not exist yet is held back until
    /// the rest of the batch has run, so a thread created later in the same
    /// batch is created before it is marked read. Results are returned in
    /// input order.
    pub fn dispatch_batch(
        &mut self,
        intents: Vec<Intent>,
        now: DateTime<Utc>,
    ) -> (DispatchOutcome, Vec<Result<(), ChatError>>) {
        let mut results: Vec<Result<(), ChatError>> = Vec::with_capacity(intents.len());
        let mut deferred = Vec::new();

        for (index, intent) in intents.into_iter().enumerate() {
            let defer = matches!(
                &intent,
                Intent::MarkRead { thread_id, .. } if !self.registry.contains(thread_id)
            );
            if defer {
                debug!(index, "deferring mark-read until thread exists");
                deferred.push((index, intent));
                results.push(Ok(()));
            } else {
                results.push(self.apply(intent, now).map(|_| ()));
            }
        }
        for (index, intent) in deferred {
            results[index] = self.apply(intent, now).map(|_| ());
        }

        (self.publish(), results)
    }

    /// Returns Ok(false) if the intent was discarded.
    fn apply(&mut self, intent: Intent, now: DateTime<Utc>) -> Result<bool, ChatError> {
        match intent {
            Intent::Open => self.panel.open(),
            Intent::Close => self.panel.close(),
            Intent::TogglePanel => self.panel.toggle(),
            Intent::SelectThread(id) => {
                self.panel.select_thread(&mut self.registry, &id, now)?;
            }
            Intent::OpenConversation(id) => {
                self.registry.ensure(&id);
                self.panel.select_thread(&mut self.registry, &id, now)?;
            }
            Intent::MarkRead { thread_id, at } => {
                if self.registry.mark_read(&thread_id, at).is_none() {
                    return Err(ChatError::UnknownThread(thread_id));
                }
            }
            Intent::Inbound(message) => self.apply_message(&message),
            Intent::Connection(event) => {
                debug!(
                    status = %event.status,
                    generation = event.generation,
                    "connection status"
                );
                self.connection_status = event.status;
                self.generation = event.generation;
            }
            Intent::CatchUp(catch_up) => {
                if catch_up.generation != self.generation {
                    warn!(
                        thread = %catch_up.thread_id,
                        response_generation = catch_up.generation,
                        current_generation = self.generation,
                        "discarding stale catch-up response"
                    );
                    return Ok(false);
                }
                debug!(
                    thread = %catch_up.thread_id,
                    count = catch_up.messages.len(),
                    "applying catch-up"
                );
                for message in &catch_up.messages {
                    self.apply_message(message);
                }
            }
        }
        Ok(true)
    }

    fn apply_message(&mut self, message: &InboundMessage) {
        let outcome = self.registry.apply_inbound(message);
        self.panel.on_inbound(&mut self.registry, message, outcome);
    }

    fn publish(&mut self) -> DispatchOutcome {
        let mut next = ChatSnapshot {
            version: self.snapshot.version,
            is_open: self.panel.is_open(),
            active_thread_id: self.panel.active_thread().cloned(),
            connection_status: self.connection_status,
            total_unread_count: recompute_total(&self.registry, &self.panel),
            threads: self.registry.snapshots(),
        };
        if next == *self.snapshot {
            return DispatchOutcome::Unchanged;
        }
        next.version += 1;
        let next = Arc::new(next);
        self.snapshot = next.clone();
        self.listeners.notify(&next);
        self.watch_tx.send_replace(next.clone());
        DispatchOutcome::Published(next.version)
    }
}
