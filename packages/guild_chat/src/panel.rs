//! Panel State Controller
//!
//! Tracks whether the chat panel is visible and which thread is on screen.
//! A closed panel never has an active thread.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::ChatError;
use crate::thread::{ApplyOutcome, ThreadRegistry};
use crate::types::{InboundMessage, ThreadId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PanelState {
    is_open: bool,
    /// Lookup key into the registry, not ownership
    active_thread: Option<ThreadId>,
}

impl PanelState {
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn active_thread(&self) -> Option<&ThreadId> {
        self.active_thread.as_ref()
    }

    /// True when `id` is the active thread of an open panel.
    pub fn is_viewing(&self, id: &ThreadId) -> bool {
        self.is_open && self.active_thread.as_ref() == Some(id)
    }

    /// Opening without an active thread marks nothing read.
    pub fn open(&mut self) {
        self.is_open = true;
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.active_thread = None;
    }

    pub fn toggle(&mut self) {
        if self.is_open {
            self.close();
        } else {
            self.open();
        }
    }

    /// Make `id` active. Selecting while closed opens the panel.
    pub fn select(&mut self, id: ThreadId) {
        self.is_open = true;
        self.active_thread = Some(id);
    }

    /// Select an existing thread and mark everything in it read.
    ///
    /// The read marker covers the newest message even if its server
    /// timestamp is ahead of `now`. Unknown ids leave the panel untouched.
    pub fn select_thread(
        &mut self,
        registry: &mut ThreadRegistry,
        id: &ThreadId,
        now: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        if !registry.contains(id) {
            return Err(ChatError::UnknownThread(id.clone()));
        }
        let newest = registry
            .get_thread(id)
            .map_or(now, |thread| thread.last_message_at);
        self.select(id.clone());
        registry.mark_read(id, now.max(newest));
        Ok(())
    }

    /// Read-on-arrival: a new message in the thread on screen, or one we
    /// authored ourselves, is marked read instead of counted.
    pub fn on_inbound(
        &self,
        registry: &mut ThreadRegistry,
        message: &InboundMessage,
        outcome: ApplyOutcome,
    ) {
        if outcome != ApplyOutcome::Applied {
            return;
        }
        if message.from_self || self.is_viewing(&message.thread_id) {
            debug!(thread = %message.thread_id, "read on arrival");
            registry.mark_read(&message.thread_id, message.sent_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{at, msg};

    #[test]
    fn initial_state_closed_without_thread() {
        let panel = PanelState::default();
        assert!(!panel.is_open());
        assert!(panel.active_thread().is_none());
    }

    #[test]
    fn close_clears_active_thread() {
        let mut panel = PanelState::default();
        panel.select(ThreadId::new("raid"));
        panel.close();
        assert!(!panel.is_open());
        assert!(panel.active_thread().is_none());

        // Re-opening does not bring the old selection back
        panel.open();
        assert!(panel.active_thread().is_none());
    }

    #[test]
    fn toggle_flips_visibility() {
        let mut panel = PanelState::default();
        panel.toggle();
        assert!(panel.is_open());
        panel.toggle();
        assert!(!panel.is_open());
    }

    #[test]
    fn select_unknown_thread_is_rejected() {
        let mut registry = ThreadRegistry::default();
        let mut panel = PanelState::default();
        panel.open();
        let before = panel.clone();

        let err = panel
            .select_thread(&mut registry, &ThreadId::new("ghost"), at(5))
            .unwrap_err();
        assert_eq!(err, ChatError::UnknownThread(ThreadId::new("ghost")));
        assert_eq!(panel, before);
    }

    #[test]
    fn select_marks_thread_read() {
        let mut registry = ThreadRegistry::default();
        registry.apply_inbound(&msg("raid", "m1", 10));
        registry.apply_inbound(&msg("raid", "m2", 11));
        let mut panel = PanelState::default();
        panel.open();

        panel
            .select_thread(&mut registry, &ThreadId::new("raid"), at(100))
            .unwrap();
        assert!(panel.is_viewing(&ThreadId::new("raid")));
        assert_eq!(registry.get_thread(&"raid".into()).unwrap().unread_count, 0);
    }

    #[test]
    fn select_covers_messages_stamped_ahead_of_local_clock() {
        let mut registry = ThreadRegistry::default();
        registry.apply_inbound(&msg("raid", "m1", 99));
        registry.apply_inbound(&msg("raid", "m2", 101));
        let mut panel = PanelState::default();
        panel.open();

        panel
            .select_thread(&mut registry, &ThreadId::new("raid"), at(100))
            .unwrap();
        let raid = registry.get_thread(&"raid".into()).unwrap();
        assert_eq!(raid.unread_count, 0);
        assert_eq!(raid.last_read_at, at(101));
    }

    #[test]
    fn inbound_for_viewed_thread_is_read_on_arrival() {
        let mut registry = ThreadRegistry::default();
        registry.ensure(&"raid".into());
        let mut panel = PanelState::default();
        panel.select(ThreadId::new("raid"));

        let message = msg("raid", "m1", 10);
        let outcome = registry.apply_inbound(&message);
        panel.on_inbound(&mut registry, &message, outcome);

        let thread = registry.get_thread(&"raid".into()).unwrap();
        assert_eq!(thread.unread_count, 0);
        assert_eq!(thread.last_message_at, at(10));
    }

    #[test]
    fn own_message_never_unread() {
        let mut registry = ThreadRegistry::default();
        let panel = PanelState::default();
        let mut message = msg("raid", "m1", 10);
        message.from_self = true;

        let outcome = registry.apply_inbound(&message);
        panel.on_inbound(&mut registry, &message, outcome);
        assert_eq!(registry.get_thread(&"raid".into()).unwrap().unread_count, 0);
    }
}
