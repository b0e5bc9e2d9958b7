//! Guild Chat - chat session and unread-notification state engine
//!
//! This crate keeps the client-side model of a site-wide chat widget: the
//! set of known conversation threads, per-thread unread counts, the open /
//! closed panel with its active thread, and the status of the realtime link.
//! It has no UI and no wire protocol; a concrete channel plugs in through the
//! [`Transport`] trait.
//!
//! # Example
//!
//! ```no_run
//! use guild_chat::{ChatConfig, ChatSession, MemoryTransport, ThreadId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = ChatSession::start(&ChatConfig::default(), MemoryTransport::new());
//!     let chat = session.handle();
//!
//!     let _subscription = chat.subscribe(|snapshot| {
//!         println!("badge: {:?}", snapshot.badge());
//!     });
//!
//!     chat.connect().await.unwrap();
//!     chat.open_conversation(ThreadId::new("raid-night")).await.unwrap();
//!
//!     session.shutdown().await;
//! }
//! ```

pub mod badge;
pub mod config;
pub mod connection;
pub mod error;
pub mod intent;
pub mod lifecycle;
pub mod listeners;
pub mod panel;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod thread;
pub mod types;
pub mod unread;

#[cfg(test)]
mod test_helpers;

pub use badge::{BADGE_CAP, badge_label};
pub use config::{ChatConfig, ConnectionConfig, RegistryConfig, SessionConfig};
pub use connection::{
    BackoffPolicy, CatchUp, ConnectionEvent, ConnectionHandle, ConnectionStatus, Link,
    MemoryTransport, Transport,
};
pub use error::{ChatError, TransportError};
pub use intent::{DispatchResult, Intent, IntentSender};
pub use lifecycle::ChatLifecycle;
pub use listeners::{Listeners, Subscription};
pub use panel::PanelState;
pub use session::{ChatSession, SessionHandle};
pub use snapshot::ChatSnapshot;
pub use store::{DispatchOutcome, Store};
pub use thread::{ApplyOutcome, Thread, ThreadRegistry, ThreadSnapshot};
pub use types::{InboundMessage, MessageId, OutboundMessage, ThreadId};
pub use unread::recompute_total;
