use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a conversation thread.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Server-assigned message identifier, unique within a thread.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A message pushed by the realtime channel (or returned by a catch-up fetch).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub thread_id: ThreadId,
    pub message_id: MessageId,
    pub sent_at: DateTime<Utc>,
    /// Opaque body, never inspected by the engine
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Authored by the signed-in user (echo of our own send)
    #[serde(default)]
    pub from_self: bool,
}

impl InboundMessage {
    pub fn new(
        thread_id: impl Into<ThreadId>,
        message_id: impl Into<MessageId>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            message_id: message_id.into(),
            sent_at,
            payload: serde_json::Value::Null,
            from_self: false,
        }
    }
}

/// A message the user wants to post into a thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub thread_id: ThreadId,
    pub payload: serde_json::Value,
}
