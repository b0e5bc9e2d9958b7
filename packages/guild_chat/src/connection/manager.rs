use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::transport::{Link, Transport};
use super::{CatchUp, ConnectionEvent, ConnectionStatus};
use crate::error::ChatError;
use crate::intent::{Intent, IntentSender};
use crate::snapshot::ChatSnapshot;
use crate::types::{OutboundMessage, ThreadId};

/// Commands accepted by the connection worker
#[derive(Debug)]
pub enum ConnectionCommand {
    Connect,
    Disconnect,
    Send {
        message: OutboundMessage,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    },
    Shutdown,
}

/// Why a connect/retry cycle ended
enum Exit {
    Disconnected,
    Shutdown,
}

/// Cloneable handle for issuing connection commands.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<ConnectionCommand>,
}

impl ConnectionHandle {
    pub async fn connect(&self) -> Result<(), ChatError> {
        self.command(ConnectionCommand::Connect).await
    }

    /// Tear the link down, cancelling any pending retry and catch-up.
    pub async fn disconnect(&self) -> Result<(), ChatError> {
        self.command(ConnectionCommand::Disconnect).await
    }

    /// Send an outbound message. Fails with `NotConnected` unless connected.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), ChatError> {
        let (tx, rx) = oneshot::channel();
        self.command(ConnectionCommand::Send {
            message,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    async fn command(&self, command: ConnectionCommand) -> Result<(), ChatError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChatError::SessionClosed)
    }
}

/// Owns the background worker driving the realtime link.
pub struct ConnectionManager {
    handle: ConnectionHandle,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the worker. Status changes, inbound messages and catch-up
    /// responses are submitted to `intents`; the set of known threads for
    /// catch-up is read from `snapshots`.
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        policy: BackoffPolicy,
        intents: IntentSender,
        snapshots: watch::Receiver<Arc<ChatSnapshot>>,
        command_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(command_capacity.max(1));
        let worker = Worker {
            transport,
            policy,
            intents,
            snapshots,
            commands: rx,
            generation: 0,
            catch_up: None,
            rng: StdRng::from_os_rng(),
        };
        Self {
            handle: ConnectionHandle { commands: tx },
            task: tokio::spawn(worker.run()),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.handle.commands.send(ConnectionCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!("connection worker panicked: {}", e);
        }
    }
}

struct Worker<T: Transport> {
    transport: Arc<T>,
    policy: BackoffPolicy,
    intents: IntentSender,
    snapshots: watch::Receiver<Arc<ChatSnapshot>>,
    commands: mpsc::Receiver<ConnectionCommand>,
    /// Bumped on every connect attempt and every drop to `disconnected`
    generation: u64,
    catch_up: Option<CancellationToken>,
    rng: StdRng,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                ConnectionCommand::Connect => match self.drive().await {
                    Exit::Disconnected => {
                        self.generation += 1;
                        info!(generation = self.generation, "disconnected");
                        self.emit(ConnectionStatus::Disconnected).await;
                    }
                    Exit::Shutdown => break,
                },
                ConnectionCommand::Disconnect => {}
                ConnectionCommand::Send { respond_to, .. } => {
                    let _ = respond_to.send(Err(ChatError::NotConnected));
                }
                ConnectionCommand::Shutdown => break,
            }
        }
        self.cancel_catch_up();
        debug!("connection worker stopped");
    }

    /// One connect/retry cycle: runs until the user disconnects, the retry
    /// budget is spent, or the worker is shut down.
    async fn drive(&mut self) -> Exit {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 && self.policy.exhausted(attempt) {
                warn!(attempts = attempt - 1, "retry budget exhausted");
                return Exit::Disconnected;
            }

            self.generation += 1;
            if attempt == 0 {
                self.emit(ConnectionStatus::Connecting).await;
            } else {
                self.emit(ConnectionStatus::Reconnecting).await;
                let delay = self.policy.delay(attempt, &mut self.rng);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "waiting before reconnect"
                );
                if let Err(exit) = self.interruptible(tokio::time::sleep(delay)).await {
                    return exit;
                }
            }

            let transport = self.transport.clone();
            let link = match self.interruptible(transport.connect()).await {
                Err(exit) => return exit,
                Ok(Ok(link)) => link,
                Ok(Err(e)) => {
                    warn!(
                        attempt,
                        generation = self.generation,
                        error = %e,
                        "connect failed"
                    );
                    attempt += 1;
                    continue;
                }
            };

            info!(generation = self.generation, "connected");
            self.emit(ConnectionStatus::Connected).await;
            self.start_catch_up();

            let exit = self.pump(link).await;
            self.cancel_catch_up();
            match exit {
                Some(exit) => return exit,
                None => {
                    warn!(generation = self.generation, "link lost, reconnecting");
                    attempt = 1;
                }
            }
        }
    }

    /// Await `fut` while still answering commands. A disconnect or shutdown
    /// drops `fut`.
    async fn interruptible<F: Future>(&mut self, fut: F) -> Result<F::Output, Exit> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Ok(out),
                command = self.commands.recv() => match command {
                    None | Some(ConnectionCommand::Shutdown) => return Err(Exit::Shutdown),
                    Some(ConnectionCommand::Disconnect) => return Err(Exit::Disconnected),
                    Some(ConnectionCommand::Connect) => {}
                    Some(ConnectionCommand::Send { respond_to, .. }) => {
                        let _ = respond_to.send(Err(ChatError::NotConnected));
                    }
                },
            }
        }
    }

    /// Forward inbound traffic. `None` means the link ended on its own.
    async fn pump(&mut self, mut link: Link) -> Option<Exit> {
        loop {
            tokio::select! {
                message = link.recv() => match message {
                    Some(message) => self.forward(Intent::Inbound(message)).await,
                    None => return None,
                },
                command = self.commands.recv() => match command {
                    None | Some(ConnectionCommand::Shutdown) => return Some(Exit::Shutdown),
                    Some(ConnectionCommand::Disconnect) => return Some(Exit::Disconnected),
                    Some(ConnectionCommand::Connect) => {}
                    Some(ConnectionCommand::Send { message, respond_to }) => {
                        let result = self.transport.send(message).await.map_err(ChatError::from);
                        let _ = respond_to.send(result);
                    }
                },
            }
        }
    }

    /// Request messages since `last_message_at` for every thread the store
    /// already knows about. Responses carry the current generation.
    fn start_catch_up(&mut self) {
        self.cancel_catch_up();
        let known: Vec<(ThreadId, DateTime<Utc>)> = self
            .snapshots
            .borrow()
            .threads
            .iter()
            .map(|t| (t.id.clone(), t.last_message_at))
            .collect();
        if known.is_empty() {
            return;
        }

        info!(
            threads = known.len(),
            generation = self.generation,
            "requesting catch-up"
        );
        let token = CancellationToken::new();
        for (thread_id, since) in known {
            let transport = self.transport.clone();
            let intents = self.intents.clone();
            let token = token.clone();
            let generation = self.generation;
            tokio::spawn(async move {
                let request = thread_id.clone();
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(thread = %thread_id, generation, "catch-up cancelled");
                    }
                    result = transport.fetch_since(&request, since) => match result {
                        Ok(messages) => {
                            let catch_up = CatchUp { generation, thread_id, messages };
                            if intents.submit(Intent::CatchUp(catch_up)).await.is_err() {
                                debug!("intent queue closed, dropping catch-up");
                            }
                        }
                        Err(e) => warn!(thread = %thread_id, error = %e, "catch-up failed"),
                    },
                }
            });
        }
        self.catch_up = Some(token);
    }

    fn cancel_catch_up(&mut self) {
        if let Some(token) = self.catch_up.take() {
            token.cancel();
        }
    }

    async fn emit(&self, status: ConnectionStatus) {
        self.forward(Intent::Connection(ConnectionEvent {
            status,
            generation: self.generation,
        }))
        .await;
    }

    async fn forward(&self, intent: Intent) {
        if self.intents.submit(intent).await.is_err() {
            debug!("intent queue closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryTransport;
    use crate::intent::Envelope;
    use crate::store::Store;
    use crate::test_helpers::{at, msg};
    use std::time::Duration;

    fn policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            max_retries,
            jitter: 0.0,
        }
    }

    struct Rig {
        transport: MemoryTransport,
        manager: ConnectionManager,
        rx: mpsc::Receiver<Envelope>,
    }

    fn rig(store: &Store, max_retries: u32) -> Rig {
        let transport = MemoryTransport::new();
        let (intents, rx) = IntentSender::channel(64);
        let manager = ConnectionManager::spawn(
            Arc::new(transport.clone()),
            policy(max_retries),
            intents,
            store.watch(),
            8,
        );
        Rig {
            transport,
            manager,
            rx,
        }
    }

    async fn next_intent(rx: &mut mpsc::Receiver<Envelope>) -> Intent {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for intent")
            .expect("intent queue closed")
            .intent
    }

    async fn next_status(rx: &mut mpsc::Receiver<Envelope>) -> ConnectionEvent {
        loop {
            if let Intent::Connection(event) = next_intent(rx).await {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_emits_connecting_then_connected() {
        let store = Store::default();
        let mut rig = rig(&store, 3);
        rig.manager.handle().connect().await.unwrap();

        let first = next_status(&mut rig.rx).await;
        assert_eq!(first.status, ConnectionStatus::Connecting);
        let second = next_status(&mut rig.rx).await;
        assert_eq!(second.status, ConnectionStatus::Connected);
        assert_eq!(first.generation, second.generation);

        rig.transport.deliver(msg("raid", "m1", 1)).await;
        assert!(matches!(next_intent(&mut rig.rx).await, Intent::Inbound(m) if m.message_id.0 == "m1"));
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn initial_failure_retries_with_backoff() {
        let store = Store::default();
        let mut rig = rig(&store, 3);
        rig.transport.fail_connects(2);
        rig.manager.handle().connect().await.unwrap();

        let statuses = [
            next_status(&mut rig.rx).await.status,
            next_status(&mut rig.rx).await.status,
            next_status(&mut rig.rx).await.status,
            next_status(&mut rig.rx).await.status,
        ];
        assert_eq!(
            statuses,
            [
                ConnectionStatus::Connecting,
                ConnectionStatus::Reconnecting,
                ConnectionStatus::Reconnecting,
                ConnectionStatus::Connected,
            ]
        );
        assert_eq!(rig.transport.connect_attempts(), 3);
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_disconnected() {
        let store = Store::default();
        let mut rig = rig(&store, 2);
        rig.transport.refuse_connections(true);
        rig.manager.handle().connect().await.unwrap();

        let mut last = next_status(&mut rig.rx).await;
        while last.status != ConnectionStatus::Disconnected {
            last = next_status(&mut rig.rx).await;
        }
        // Initial attempt plus two retries
        assert_eq!(rig.transport.connect_attempts(), 3);

        // Outbound actions fail until reconnect
        let outbound = OutboundMessage {
            thread_id: "raid".into(),
            payload: serde_json::Value::Null,
        };
        assert_eq!(
            rig.manager.handle().send(outbound).await,
            Err(ChatError::NotConnected)
        );
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_reconnects_and_requests_catch_up() {
        let mut store = Store::default();
        store.dispatch(Intent::Inbound(msg("raid", "m1", 10))).unwrap();
        store.dispatch(Intent::Inbound(msg("loot", "m1", 20))).unwrap();

        let mut rig = rig(&store, 3);
        rig.transport.record(msg("raid", "m1", 10));
        rig.transport.record(msg("raid", "m2", 11));
        rig.manager.handle().connect().await.unwrap();
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Connected);

        rig.transport.drop_link();
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Reconnecting);
        let connected = next_status(&mut rig.rx).await;
        assert_eq!(connected.status, ConnectionStatus::Connected);

        // Responses to the first connect may race the link loss; only the
        // reconnect's responses are guaranteed.
        let mut latest = Vec::new();
        while latest.len() < 2 {
            if let Intent::CatchUp(c) = next_intent(&mut rig.rx).await {
                if c.generation == connected.generation {
                    latest.push(c);
                }
            }
        }
        let raid = latest.iter().find(|c| c.thread_id.as_str() == "raid").unwrap();
        assert_eq!(raid.messages.len(), 2);
        let loot = latest.iter().find(|c| c.thread_id.as_str() == "loot").unwrap();
        assert!(loot.messages.is_empty());

        let requests = rig.transport.fetch_requests();
        assert!(requests.contains(&(ThreadId::new("raid"), at(10))));
        assert!(requests.contains(&(ThreadId::new("loot"), at(20))));
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_cancels_pending_catch_up() {
        let mut store = Store::default();
        store.dispatch(Intent::Inbound(msg("raid", "m1", 10))).unwrap();

        let mut rig = rig(&store, 3);
        rig.transport.hold_catch_up();
        rig.manager.handle().connect().await.unwrap();
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Connecting);
        let first = next_status(&mut rig.rx).await;
        assert_eq!(first.status, ConnectionStatus::Connected);

        rig.transport.drop_link();
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Reconnecting);
        let second = next_status(&mut rig.rx).await;
        assert_eq!(second.status, ConnectionStatus::Connected);

        rig.transport.release_catch_up();
        match next_intent(&mut rig.rx).await {
            Intent::CatchUp(c) => assert_eq!(c.generation, second.generation),
            other => panic!("expected catch-up, got {other:?}"),
        }

        // The held response of the first connection never shows up
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rig.rx.try_recv().is_err());
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_catch_up() {
        let mut store = Store::default();
        store.dispatch(Intent::Inbound(msg("raid", "m1", 10))).unwrap();

        let mut rig = rig(&store, 3);
        rig.transport.hold_catch_up();
        let handle = rig.manager.handle();
        handle.connect().await.unwrap();
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Connecting);
        let connected = next_status(&mut rig.rx).await;
        assert_eq!(connected.status, ConnectionStatus::Connected);
        while rig.transport.fetch_requests().is_empty() {
            tokio::task::yield_now().await;
        }

        handle.disconnect().await.unwrap();
        let disconnected = next_status(&mut rig.rx).await;
        assert_eq!(disconnected.status, ConnectionStatus::Disconnected);
        assert!(disconnected.generation > connected.generation);

        rig.transport.release_catch_up();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rig.rx.try_recv().is_err());
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_backoff_stops_retrying() {
        let store = Store::default();
        let mut rig = rig(&store, 10);
        rig.transport.refuse_connections(true);
        let handle = rig.manager.handle();
        handle.connect().await.unwrap();
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut rig.rx).await.status, ConnectionStatus::Reconnecting);

        handle.disconnect().await.unwrap();
        let event = next_status(&mut rig.rx).await;
        assert_eq!(event.status, ConnectionStatus::Disconnected);
        let attempts = rig.transport.connect_attempts();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rig.transport.connect_attempts(), attempts);
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_connected_reaches_transport() {
        let store = Store::default();
        let mut rig = rig(&store, 3);
        let handle = rig.manager.handle();
        handle.connect().await.unwrap();
        next_status(&mut rig.rx).await;
        next_status(&mut rig.rx).await;

        let outbound = OutboundMessage {
            thread_id: "raid".into(),
            payload: serde_json::json!({"text": "pull in 10"}),
        };
        handle.send(outbound.clone()).await.unwrap();
        assert_eq!(rig.transport.sent(), vec![outbound]);
        rig.manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn generation_grows_across_cycles() {
        let store = Store::default();
        let mut rig = rig(&store, 3);
        let handle = rig.manager.handle();
        handle.connect().await.unwrap();
        next_status(&mut rig.rx).await;
        let connected = next_status(&mut rig.rx).await;

        handle.disconnect().await.unwrap();
        let disconnected = next_status(&mut rig.rx).await;
        assert_eq!(disconnected.status, ConnectionStatus::Disconnected);
        assert!(disconnected.generation > connected.generation);

        handle.connect().await.unwrap();
        let connecting = next_status(&mut rig.rx).await;
        assert!(connecting.generation > disconnected.generation);
        rig.manager.shutdown().await;
    }
}
