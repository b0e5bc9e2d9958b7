//! The ordered intent queue.
//!
//! UI actions and connection traffic are funneled through one channel and
//! applied to the store one at a time.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::connection::{CatchUp, ConnectionEvent};
use crate::error::ChatError;
use crate::store::DispatchOutcome;
use crate::types::{InboundMessage, ThreadId};

/// Everything that may change chat state.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    Open,
    Close,
    TogglePanel,
    SelectThread(ThreadId),
    /// Create the thread if needed, open the panel and select it
    OpenConversation(ThreadId),
    MarkRead {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
    Inbound(InboundMessage),
    Connection(ConnectionEvent),
    CatchUp(CatchUp),
}

pub type DispatchResult = Result<DispatchOutcome, ChatError>;

/// An intent plus an optional reply slot for callers that need the result.
#[derive(Debug)]
pub struct Envelope {
    pub intent: Intent,
    pub respond_to: Option<oneshot::Sender<DispatchResult>>,
}

/// Producer side of the intent queue.
#[derive(Clone, Debug)]
pub struct IntentSender {
    tx: mpsc::Sender<Envelope>,
}

impl IntentSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting for the result.
    pub async fn submit(&self, intent: Intent) -> Result<(), ChatError> {
        self.tx
            .send(Envelope {
                intent,
                respond_to: None,
            })
            .await
            .map_err(|_| ChatError::SessionClosed)
    }

    /// Enqueue and wait until the store has applied it.
    pub async fn request(&self, intent: Intent) -> DispatchResult {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                intent,
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
