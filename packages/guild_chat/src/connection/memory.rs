//! In-process transport.
//!
//! Plays the server side of the channel: it keeps a message history for
//! catch-up, and exposes knobs to fail connects or cut the live link.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::transport::{Link, Transport};
use crate::error::TransportError;
use crate::types::{InboundMessage, OutboundMessage, ThreadId};

const LINK_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    history: Vec<InboundMessage>,
    link: Option<mpsc::Sender<InboundMessage>>,
    fail_connects: u32,
    refuse: bool,
    connect_attempts: u32,
    fetch_requests: Vec<(ThreadId, DateTime<Utc>)>,
    sent: Vec<OutboundMessage>,
}

/// Cloneable handle; all clones share the same simulated server.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
    /// Catch-up responses wait until this is true
    fetch_gate: watch::Sender<bool>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (fetch_gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            fetch_gate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `message` server-side and push it over the live link, if any.
    /// Returns true if it went out live.
    pub async fn deliver(&self, message: InboundMessage) -> bool {
        let link = {
            let mut inner = self.lock();
            inner.history.push(message.clone());
            inner.link.clone()
        };
        match link {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Record a message only in history (sent while the client was offline).
    pub fn record(&self, message: InboundMessage) {
        self.lock().history.push(message);
    }

    /// Cut the live link, as if the socket died.
    pub fn drop_link(&self) {
        if self.lock().link.take().is_some() {
            debug!("memory transport: link dropped");
        }
    }

    pub fn is_linked(&self) -> bool {
        self.lock().link.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_connects(&self, count: u32) {
        self.lock().fail_connects = count;
    }

    /// Refuse every connect attempt until called again with `false`.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Hold catch-up responses until `release_catch_up` is called.
    pub fn hold_catch_up(&self) {
        self.fetch_gate.send_replace(false);
    }

    pub fn release_catch_up(&self) {
        self.fetch_gate.send_replace(true);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn fetch_requests(&self) -> Vec<(ThreadId, DateTime<Utc>)> {
        self.lock().fetch_requests.clone()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.lock().sent.clone()
    }
}

impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<Link, TransportError> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;
        if inner.refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            return Err(TransportError::Connect("simulated failure".to_string()));
        }
        let (tx, rx) = mpsc::channel(LINK_CAPACITY);
        inner.link = Some(tx);
        Ok(Link::new(rx))
    }

    async fn fetch_since(
        &self,
        thread_id: &ThreadId,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, TransportError> {
        self.lock().fetch_requests.push((thread_id.clone(), since));

        let mut gate = self.fetch_gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::Closed);
        }

        let inner = self.lock();
        Ok(inner
            .history
            .iter()
            .filter(|m| &m.thread_id == thread_id && m.sent_at >= since)
            .cloned()
            .collect())
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.link.is_none() {
            return Err(TransportError::Send("not linked".to_string()));
        }
        inner.sent.push(message);
        Ok(())
    }
}
