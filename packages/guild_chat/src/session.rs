//! Session actor
//!
//! A `ChatSession` is the lifecycle-scoped owner of one `Store`: a dispatcher
//! task applies queued intents one at a time, and a connection worker feeds
//! realtime traffic into the same queue. Consumers hold a `SessionHandle`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::connection::{ConnectionHandle, ConnectionManager, Transport};
use crate::error::ChatError;
use crate::intent::{Envelope, Intent, IntentSender};
use crate::listeners::{Listeners, Subscription};
use crate::snapshot::ChatSnapshot;
use crate::store::{DispatchOutcome, Store};
use crate::types::{OutboundMessage, ThreadId};

/// Handle to a running session. Cheap to clone; every method fails with
/// `SessionClosed` once the session has been torn down.
#[derive(Clone)]
pub struct SessionHandle {
    intents: IntentSender,
    connection: ConnectionHandle,
    listeners: Arc<Listeners>,
    snapshots: watch::Receiver<Arc<ChatSnapshot>>,
}

impl SessionHandle {
    pub async fn open(&self) -> Result<(), ChatError> {
        self.request(Intent::Open).await
    }

    pub async fn close(&self) -> Result<(), ChatError> {
        self.request(Intent::Close).await
    }

    pub async fn toggle_panel(&self) -> Result<(), ChatError> {
        self.request(Intent::TogglePanel).await
    }

    /// Fails with `UnknownThread` (panel unchanged) if the id is not known.
    pub async fn select_thread(&self, thread_id: ThreadId) -> Result<(), ChatError> {
        self.request(Intent::SelectThread(thread_id)).await
    }

    pub async fn open_conversation(&self, thread_id: ThreadId) -> Result<(), ChatError> {
        self.request(Intent::OpenConversation(thread_id)).await
    }

    pub async fn mark_read(&self, thread_id: ThreadId, at: DateTime<Utc>) -> Result<(), ChatError> {
        self.request(Intent::MarkRead { thread_id, at }).await
    }

    pub async fn connect(&self) -> Result<(), ChatError> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), ChatError> {
        self.connection.disconnect().await
    }

    pub async fn send_message(
        &self,
        thread_id: ThreadId,
        payload: serde_json::Value,
    ) -> Result<(), ChatError> {
        if self.intents.is_closed() {
            return Err(ChatError::SessionClosed);
        }
        self.connection
            .send(OutboundMessage { thread_id, payload })
            .await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(Arc<ChatSnapshot>) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    pub fn watch(&self) -> watch::Receiver<Arc<ChatSnapshot>> {
        self.snapshots.clone()
    }

    async fn request(&self, intent: Intent) -> Result<(), ChatError> {
        self.intents.request(intent).await.map(|_| ())
    }
}

pub struct ChatSession {
    handle: SessionHandle,
    connection: ConnectionManager,
    dispatcher: JoinHandle<()>,
    cancel: CancellationToken,
}

impl ChatSession {
    /// Start a fresh session. Must be called inside a tokio runtime.
    /// The connection stays down until `connect()` is issued.
    pub fn start<T: Transport>(config: &ChatConfig, transport: T) -> Self {
        let store = Store::new(&config.registry);
        let (intents, rx) = IntentSender::channel(config.session.intent_queue_capacity);
        let connection = ConnectionManager::spawn(
            Arc::new(transport),
            config.connection.backoff(),
            intents.clone(),
            store.watch(),
            config.session.command_queue_capacity,
        );
        let handle = SessionHandle {
            intents,
            connection: connection.handle(),
            listeners: store.listeners(),
            snapshots: store.watch(),
        };
        let cancel = CancellationToken::new();
        let dispatcher = tokio::spawn(run_dispatcher(store, rx, cancel.clone()));
        info!("chat session started");
        Self {
            handle,
            connection,
            dispatcher,
            cancel,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop the connection, drop the store and all thread state.
    pub async fn shutdown(self) {
        self.connection.shutdown().await;
        self.cancel.cancel();
        if let Err(e) = self.dispatcher.await {
            warn!("chat dispatcher panicked: {}", e);
        }
        info!("chat session torn down");
    }
}

async fn run_dispatcher(
    mut store: Store,
    mut rx: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(Envelope { intent, respond_to }) = envelope else {
                    break;
                };
                let result = store.dispatch(intent);
                match &result {
                    Ok(DispatchOutcome::Published(version)) => {
                        debug!(version, "published snapshot");
                    }
                    Ok(_) => {}
                    Err(e) => debug!(code = e.error_code(), "intent rejected: {}", e),
                }
                if let Some(tx) = respond_to {
                    let _ = tx.send(result);
                }
            }
        }
    }
    rx.close();
}
