//! JSON-lines scripts that drive a session against the in-memory transport.
//!
//! One step per line, tagged by `step`:
//!
//! ```text
//! {"step": "connect"}
//! {"step": "wait", "ms": 50}
//! {"step": "deliver", "thread_id": "raid", "message_id": "m1", "sent_at": "2026-01-01T20:00:00Z"}
//! {"step": "select", "thread_id": "raid"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use guild_chat::{ChatError, ChatSnapshot, InboundMessage, MemoryTransport, SessionHandle, ThreadId};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Open,
    Close,
    Toggle,
    Select {
        thread_id: ThreadId,
    },
    OpenConversation {
        thread_id: ThreadId,
    },
    MarkRead {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
    Connect,
    Disconnect,
    /// Push a message over the live link
    Deliver(InboundMessage),
    /// Add a message to server history only (seen by catch-up)
    Record(InboundMessage),
    DropLink,
    FailConnects {
        count: u32,
    },
    Wait {
        ms: u64,
    },
    Send {
        thread_id: ThreadId,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Print the current snapshot
    Snapshot,
}

pub fn parse(source: &str) -> Result<Vec<Step>> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid step", index + 1))
        })
        .collect()
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse(&source)
}

/// Run every step in order. Rejected intents are logged and do not stop the
/// script; a closed session does.
pub async fn run(steps: Vec<Step>, chat: &SessionHandle, transport: &MemoryTransport) -> Result<()> {
    for (index, step) in steps.into_iter().enumerate() {
        debug!(index, ?step, "running step");
        let result = match step {
            Step::Open => chat.open().await,
            Step::Close => chat.close().await,
            Step::Toggle => chat.toggle_panel().await,
            Step::Select { thread_id } => chat.select_thread(thread_id).await,
            Step::OpenConversation { thread_id } => chat.open_conversation(thread_id).await,
            Step::MarkRead { thread_id, at } => chat.mark_read(thread_id, at).await,
            Step::Connect => chat.connect().await,
            Step::Disconnect => chat.disconnect().await,
            Step::Deliver(message) => {
                if !transport.deliver(message).await {
                    warn!(index, "no live link, message dropped");
                }
                Ok(())
            }
            Step::Record(message) => {
                transport.record(message);
                Ok(())
            }
            Step::DropLink => {
                transport.drop_link();
                Ok(())
            }
            Step::FailConnects { count } => {
                transport.fail_connects(count);
                Ok(())
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
            Step::Send { thread_id, payload } => chat.send_message(thread_id, payload).await,
            Step::Snapshot => {
                print_snapshot(&chat.snapshot())?;
                Ok(())
            }
        };
        match result {
            Ok(()) => {}
            Err(ChatError::SessionClosed) => anyhow::bail!("session closed at step {}", index + 1),
            Err(e) => warn!(index, code = e.error_code(), "step rejected: {}", e),
        }
    }
    Ok(())
}

pub fn print_snapshot(snapshot: &ChatSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string(snapshot)?);
    Ok(())
}
