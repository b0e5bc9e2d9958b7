use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{InboundMessage, OutboundMessage, ThreadId};

/// An established channel. Messages for one thread arrive in `sent_at`
/// order; the stream ending means the transport failed.
pub struct Link {
    inbound: mpsc::Receiver<InboundMessage>,
}

impl Link {
    pub fn new(inbound: mpsc::Receiver<InboundMessage>) -> Self {
        Self { inbound }
    }

    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }
}

/// Any ordered, at-least-once bidirectional channel.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<Link, TransportError>> + Send;

    /// Messages of `thread_id` sent at or after `since`. May repeat
    /// messages the caller has already applied.
    fn fetch_since(
        &self,
        thread_id: &ThreadId,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<InboundMessage>, TransportError>> + Send;

    fn send(
        &self,
        message: OutboundMessage,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
