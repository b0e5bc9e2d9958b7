//! Error types for the chat engine.
//!
//! Nothing here is fatal to the host application. The worst case is a
//! `disconnected` status with stale-but-consistent cached counts.

use crate::types::ThreadId;

/// Failures of the underlying realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("catch-up fetch failed: {0}")]
    Fetch(String),

    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unknown thread: {0}")]
    UnknownThread(ThreadId),

    #[error("not connected")]
    NotConnected,

    #[error("chat session is closed")]
    SessionClosed,
}

impl ChatError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::UnknownThread(_) => "unknown_thread",
            Self::NotConnected => "not_connected",
            Self::SessionClosed => "session_closed",
        }
    }

    /// Whether the same action may succeed once the connection recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(ChatError::NotConnected.error_code(), "not_connected");
        assert_eq!(
            ChatError::UnknownThread(ThreadId::new("raid")).error_code(),
            "unknown_thread"
        );
        assert_eq!(
            ChatError::from(TransportError::Closed).error_code(),
            "transport_error"
        );
    }

    #[test]
    fn retryable() {
        assert!(ChatError::NotConnected.is_retryable());
        assert!(ChatError::Transport(TransportError::Connect("refused".into())).is_retryable());
        assert!(!ChatError::UnknownThread(ThreadId::new("x")).is_retryable());
        assert!(!ChatError::SessionClosed.is_retryable());
    }

    #[test]
    fn transport_display_is_transparent() {
        let err = ChatError::from(TransportError::Send("socket reset".into()));
        assert_eq!(err.to_string(), "send failed: socket reset");
    }
}
