//! Sign-in / sign-out scoping of chat sessions.

use tracing::info;

use crate::config::ChatConfig;
use crate::connection::Transport;
use crate::error::ChatError;
use crate::session::{ChatSession, SessionHandle};

/// Keeps at most one live session, bound to the signed-in user.
///
/// Signing in as a different user tears the old session down first, so no
/// thread state or connection survives an identity change.
pub struct ChatLifecycle<F> {
    config: ChatConfig,
    factory: F,
    active: Option<(String, ChatSession)>,
}

impl<F> ChatLifecycle<F> {
    /// `factory` builds a transport for the user being signed in.
    pub fn new(config: ChatConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            active: None,
        }
    }

    /// Start (or reuse) the session for `user_id` and ask it to connect.
    pub async fn sign_in<T>(&mut self, user_id: &str) -> Result<SessionHandle, ChatError>
    where
        F: FnMut(&str) -> T,
        T: Transport,
    {
        if let Some((user, session)) = &self.active {
            if user == user_id {
                return Ok(session.handle());
            }
        }
        self.sign_out().await;

        let transport = (self.factory)(user_id);
        let session = ChatSession::start(&self.config, transport);
        let handle = session.handle();
        info!(user = user_id, "chat session bound to user");
        self.active = Some((user_id.to_string(), session));
        handle.connect().await?;
        Ok(handle)
    }

    /// Tear down the current session, if any.
    pub async fn sign_out(&mut self) {
        if let Some((user, session)) = self.active.take() {
            info!(user = %user, "signing out of chat");
            session.shutdown().await;
        }
    }

    pub fn current(&self) -> Option<SessionHandle> {
        self.active.as_ref().map(|(_, session)| session.handle())
    }

    pub fn user(&self) -> Option<&str> {
        self.active.as_ref().map(|(user, _)| user.as_str())
    }
}
