//! Unread Aggregator
//!
//! The total is always derived from the registry and panel state, never kept
//! as a running counter that could drift after a missed increment.

use crate::panel::PanelState;
use crate::thread::ThreadRegistry;

/// Sum of per-thread unread counts, excluding the thread on screen.
pub fn recompute_total(registry: &ThreadRegistry, panel: &PanelState) -> u64 {
    registry
        .iter()
        .filter(|thread| !panel.is_viewing(thread.id()))
        .fold(0u64, |total, thread| {
            total.saturating_add(thread.unread_count())
        })
}
