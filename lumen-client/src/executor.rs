//! Runs remote operations with one silent re-authentication
//!
//! Per call:
//!
//! 1. No session: fail with [`ClientError::NotAuthenticated`]; the
//!    operation is never invoked.
//! 2. Fetch the client for the current session and invoke the operation.
//! 3. On an authentication failure with budget left, re-authenticate from
//!    saved credentials and go back to 2 with the budget consumed.
//! 4. When the budget is spent, no credentials are saved or the
//!    re-authentication fails, sign out and return the authentication
//!    error of the last call.
//!
//! Every other error, cancellation included, is returned as is.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use log::{debug, info, warn};
use lumen_model::UserId;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::error::{ClientError, ClientResult};
use crate::session::{SessionManager, SessionState};
use crate::transport::Transport;

/// Re-authentications allowed per call
pub const DEFAULT_MAX_AUTH_RETRIES: u32 = 1;

/// What an operation receives: the client and the session it belongs to
pub struct SessionClient<C> {
    client: Arc<C>,
    session: SessionState,
}

impl<C> SessionClient<C> {
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn user_id(&self) -> Result<&UserId, ClientError> {
        self.session.require_user_id()
    }
}

impl<C> Deref for SessionClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C> Clone for SessionClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            session: self.session.clone(),
        }
    }
}

impl<C> fmt::Debug for SessionClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

pub struct AuthRetryExecutor<T: Transport, S: CredentialStore> {
    manager: Arc<SessionManager<T, S>>,
    max_retries: u32,
}

impl<T: Transport, S: CredentialStore> Clone for AuthRetryExecutor<T, S> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            max_retries: self.max_retries,
        }
    }
}

impl<T: Transport, S: CredentialStore> fmt::Debug for AuthRetryExecutor<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRetryExecutor")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, S: CredentialStore> AuthRetryExecutor<T, S> {
    pub fn new(manager: Arc<SessionManager<T, S>>) -> Self {
        Self {
            manager,
            max_retries: DEFAULT_MAX_AUTH_RETRIES,
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager<T, S>> {
        &self.manager
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op` against the current session
    ///
    /// `op` may be invoked twice: once with the original client and, after
    /// a successful re-authentication, once with a fresh one.
    pub async fn execute<R, F, Fut>(&self, op: F) -> ClientResult<R>
    where
        F: Fn(SessionClient<T::Client>) -> Fut,
        Fut: Future<Output = ClientResult<R>>,
    {
        self.run(None, op).await
    }

    /// [`execute`](Self::execute), abandoned with [`ClientError::Cancelled`]
    /// as soon as `cancel` fires
    pub async fn execute_cancellable<R, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> ClientResult<R>
    where
        F: Fn(SessionClient<T::Client>) -> Fut,
        Fut: Future<Output = ClientResult<R>>,
    {
        self.run(Some(cancel), op).await
    }

    async fn run<R, F, Fut>(
        &self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> ClientResult<R>
    where
        F: Fn(SessionClient<T::Client>) -> Fut,
        Fut: Future<Output = ClientResult<R>>,
    {
        let mut retries_left = self.max_retries;
        // Authentication error of the call that led to a re-authentication
        let mut pending: Option<ClientError> = None;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ClientError::Cancelled);
            }

            let session = self.current_session(pending.take())?;
            let Some(token) = session.access_token().map(str::to_owned) else {
                return Err(ClientError::NotAuthenticated);
            };

            let client = guarded(
                cancel,
                self.manager.factory().get_client(session.server_url(), &token),
            )
            .await?;

            let call = op(SessionClient {
                client,
                session: session.clone(),
            });
            let error = match guarded(cancel, call).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_authentication() => e,
                Err(e) => return Err(e),
            };

            if retries_left == 0 {
                warn!("[AuthRetry] Token rejected after re-authentication; signing out");
                self.manager.force_logout(&token).await;
                return Err(error);
            }
            retries_left -= 1;

            info!("[AuthRetry] Token rejected ({}); re-authenticating", error);
            match guarded(cancel, self.manager.reauthenticate(&session)).await {
                Ok(_) => {
                    debug!("[AuthRetry] Retrying with renewed session");
                    pending = Some(error);
                }
                Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
                Err(reauth_error) => {
                    warn!(
                        "[AuthRetry] Re-authentication failed: {}",
                        reauth_error
                    );
                    self.manager.force_logout(&token).await;
                    return Err(error);
                }
            }
        }
    }

    /// Session to call with; `pending` is reported instead of
    /// [`ClientError::NotAuthenticated`] when the session is gone
    fn current_session(
        &self,
        pending: Option<ClientError>,
    ) -> ClientResult<SessionState> {
        match self.manager.session().get() {
            Some(session) if session.is_connected() => Ok(session),
            _ => Err(pending.unwrap_or(ClientError::NotAuthenticated)),
        }
    }
}

/// Race `fut` against `cancel`; cancellation wins ties
async fn guarded<R>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = ClientResult<R>>,
) -> ClientResult<R> {
    match cancel {
        None => fut.await,
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ClientError::Cancelled),
                result = fut => result,
            }
        }
    }
}
