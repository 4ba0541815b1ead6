//! Observable session cell
//!
//! The store wraps a tokio `watch` channel: reads never block and every
//! write is visible to all readers and subscribers as soon as it returns.
//! Writers live inside this crate only; see
//! [`SessionManager`](super::SessionManager).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lumen_model::UserId;
use tokio::sync::watch;

use crate::error::ClientError;

/// Who we are connected as, and where
///
/// Built only through [`SessionState::authenticated`], so a value that
/// exists always carries a token and a login time.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    server_url: String,
    user_id: Option<UserId>,
    username: Option<String>,
    access_token: Option<String>,
    login_timestamp: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn authenticated(
        server_url: impl Into<String>,
        user_id: UserId,
        username: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            user_id: Some(user_id),
            username: Some(username.into()),
            access_token: Some(access_token.into()),
            login_timestamp: Some(Utc::now()),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// User id, or [`ClientError::NotAuthenticated`] when unknown
    pub fn require_user_id(&self) -> Result<&UserId, ClientError> {
        self.user_id.as_ref().ok_or(ClientError::NotAuthenticated)
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn login_timestamp(&self) -> Option<DateTime<Utc>> {
        self.login_timestamp
    }

    /// Never true without a token
    pub fn is_connected(&self) -> bool {
        self.access_token.is_some()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("server_url", &self.server_url)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("login_timestamp", &self.login_timestamp)
            .finish()
    }
}

/// Single source of truth for the current session
#[derive(Clone, Debug)]
pub struct SessionStore {
    sender: Arc<watch::Sender<Option<SessionState>>>,
    receiver: watch::Receiver<Option<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Snapshot of the current session
    pub fn get(&self) -> Option<SessionState> {
        self.receiver.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.receiver
            .borrow()
            .as_ref()
            .is_some_and(SessionState::is_connected)
    }

    /// Access the session without cloning
    pub fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&SessionState>) -> R,
    {
        f(self.receiver.borrow().as_ref())
    }

    pub fn access_token(&self) -> Option<String> {
        self.with_session(|s| s.and_then(|s| s.access_token().map(str::to_owned)))
    }

    /// Subscribe to session changes
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionState>> {
        self.receiver.clone()
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.sender.send_replace(Some(state));
    }

    /// Idempotent; returns whether a session was present
    pub(crate) fn clear(&self) -> bool {
        self.sender.send_if_modified(|current| current.take().is_some())
    }

    /// Clear only while the session still carries `token`
    ///
    /// Returns false when the session was already replaced or cleared.
    pub(crate) fn clear_if_token(&self, token: &str) -> bool {
        self.sender.send_if_modified(|current| {
            let matches = current
                .as_ref()
                .and_then(SessionState::access_token)
                .is_some_and(|t| t == token);
            if matches {
                *current = None;
            }
            matches
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
