//! Shared builders for unit tests.

use chrono::{DateTime, Utc};

use crate::types::InboundMessage;

/// Timestamp `secs` seconds after the epoch
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn msg(thread: &str, id: &str, secs: i64) -> InboundMessage {
    InboundMessage::new(thread, id, at(secs))
}
