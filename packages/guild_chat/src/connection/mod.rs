//! Connection Manager
//!
//! Owns the single logical link to the realtime channel:
//! - `transport` - the transport trait every concrete channel implements
//! - `backoff` - capped, jittered exponential retry policy
//! - `manager` - the worker driving connect/retry/catch-up
//! - `memory` - in-process transport used by tests and the simulator

mod backoff;
mod manager;
pub mod memory;
mod transport;

use serde::{Deserialize, Serialize};

use crate::types::{InboundMessage, ThreadId};

pub use backoff::BackoffPolicy;
pub use manager::{ConnectionCommand, ConnectionHandle, ConnectionManager};
pub use memory::MemoryTransport;
pub use transport::{Link, Transport};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status transition, tagged with the connection generation it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub status: ConnectionStatus,
    pub generation: u64,
}

/// Response to a catch-up request issued by generation `generation`.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchUp {
    pub generation: u64,
    pub thread_id: ThreadId,
    pub messages: Vec<InboundMessage>,
}
