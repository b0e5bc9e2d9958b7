use serde::Serialize;

use crate::badge::badge_label;
use crate::connection::ConnectionStatus;
use crate::thread::ThreadSnapshot;
use crate::types::ThreadId;

/// Read-only view of the whole chat state, published after every change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChatSnapshot {
    /// Increases by one with every published snapshot
    pub version: u64,
    pub is_open: bool,
    pub active_thread_id: Option<ThreadId>,
    pub connection_status: ConnectionStatus,
    pub total_unread_count: u64,
    /// Newest activity first
    pub threads: Vec<ThreadSnapshot>,
}

impl ChatSnapshot {
    pub fn thread(&self, id: &ThreadId) -> Option<&ThreadSnapshot> {
        self.threads.iter().find(|t| &t.id == id)
    }

    pub fn unread_count(&self, id: &ThreadId) -> u64 {
        self.thread(id).map(|t| t.unread_count).unwrap_or(0)
    }

    /// Label for the unread badge, `None` when there is nothing unread.
    pub fn badge(&self) -> Option<String> {
        (self.total_unread_count > 0).then(|| badge_label(self.total_unread_count))
    }
}
