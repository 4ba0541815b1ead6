//! Login, re-authentication and logout
//!
//! [`SessionManager`] is the only writer of the [`SessionStore`]. Login and
//! re-authentication are serialized by one async mutex, separate from the
//! client factory's lock, so a re-authentication can build clients while
//! holding it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use lumen_model::ServerInfo;
use tokio::sync::Mutex;

use super::state::{SessionState, SessionStore};
use crate::credentials::{CredentialStore, SecureCredential};
use crate::error::{ClientError, ClientResult};
use crate::factory::ClientFactory;
use crate::transport::{MediaClient, Transport, normalize_server_url};

/// Upper bound on the best-effort server logout call
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SessionManager<T: Transport, S: CredentialStore> {
    store: SessionStore,
    credentials: Arc<S>,
    factory: Arc<ClientFactory<T>>,
    auth_lock: Mutex<()>,
}

impl<T: Transport, S: CredentialStore> fmt::Debug for SessionManager<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("session", &self.store.get())
            .field("factory", &self.factory)
            .finish()
    }
}

impl<T: Transport, S: CredentialStore> SessionManager<T, S> {
    pub fn new(transport: Arc<T>, credentials: Arc<S>) -> Self {
        Self::with_factory(Arc::new(ClientFactory::new(transport)), credentials)
    }

    pub fn with_factory(
        factory: Arc<ClientFactory<T>>,
        credentials: Arc<S>,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            credentials,
            factory,
            auth_lock: Mutex::new(()),
        }
    }

    /// Read-only view of the session
    pub fn session(&self) -> &SessionStore {
        &self.store
    }

    pub fn current(&self) -> Option<SessionState> {
        self.store.get()
    }

    pub fn factory(&self) -> &Arc<ClientFactory<T>> {
        &self.factory
    }

    pub fn credentials(&self) -> &Arc<S> {
        &self.credentials
    }

    /// Probe a server's public endpoint; needs no session
    pub async fn server_info(&self, server_url: &str) -> ClientResult<ServerInfo> {
        let client = self.factory.connect_anonymous(server_url).await?;
        client.server_info().await
    }

    /// Sign in with a username and password
    ///
    /// With `remember` set the password is saved so an expired token can
    /// later be renewed silently. A failure to save is logged, not returned.
    pub async fn login(
        &self,
        server_url: &str,
        username: &str,
        password: &SecureCredential,
        remember: bool,
    ) -> ClientResult<SessionState> {
        let server_url = normalize_server_url(server_url)?;
        let _guard = self.auth_lock.lock().await;

        let state = self.authenticate(&server_url, username, password).await?;
        self.store.set(state.clone());
        self.factory.invalidate().await;

        if remember
            && let Err(e) =
                self.credentials.save(&server_url, username, password).await
        {
            warn!("[SessionManager] Failed to save credentials: {}", e);
        }

        Ok(state)
    }

    /// Sign in with previously saved credentials
    pub async fn resume(
        &self,
        server_url: &str,
        username: &str,
    ) -> ClientResult<SessionState> {
        let server_url = normalize_server_url(server_url)?;
        let _guard = self.auth_lock.lock().await;

        let Some(password) = self.credentials.get(&server_url, username).await
        else {
            debug!(
                "[SessionManager] No saved credentials for {} on {}",
                username, server_url
            );
            return Err(ClientError::NotAuthenticated);
        };

        let state = self.authenticate(&server_url, username, &password).await?;
        self.store.set(state.clone());
        self.factory.invalidate().await;
        Ok(state)
    }

    /// Renew `failed`, the session whose token the server rejected
    ///
    /// When the current session belongs to the same server and user but
    /// already carries a different token (another caller renewed it while
    /// this one waited for the lock) it is returned without a new login.
    /// A session of another user or server is never handed out; that case,
    /// a missing session and missing saved credentials all fail with
    /// [`ClientError::NotAuthenticated`].
    pub async fn reauthenticate(
        &self,
        failed: &SessionState,
    ) -> ClientResult<SessionState> {
        let _guard = self.auth_lock.lock().await;

        let username = failed
            .username()
            .ok_or(ClientError::NotAuthenticated)?
            .to_string();
        let server_url = failed.server_url().to_string();

        let current = self.store.get().ok_or(ClientError::NotAuthenticated)?;
        if current.server_url() != server_url
            || current.username() != Some(username.as_str())
        {
            info!(
                "[SessionManager] Session switched to {:?} on {}; not renewing {}",
                current.username(),
                current.server_url(),
                username
            );
            return Err(ClientError::NotAuthenticated);
        }
        if current.is_connected()
            && current.access_token() != failed.access_token()
        {
            debug!("[SessionManager] Session already renewed; reusing it");
            return Ok(current);
        }

        let Some(password) = self.credentials.get(&server_url, &username).await
        else {
            info!(
                "[SessionManager] No saved credentials for {}; cannot re-authenticate",
                username
            );
            return Err(ClientError::NotAuthenticated);
        };

        let state = self.authenticate(&server_url, &username, &password).await?;
        self.store.set(state.clone());
        self.factory.invalidate().await;
        info!("[SessionManager] Re-authenticated {} on {}", username, server_url);
        Ok(state)
    }

    /// Delete the saved password for `username` on `server_url`
    ///
    /// The URL is normalized first, matching the key `login` saved under.
    pub async fn forget_credentials(
        &self,
        server_url: &str,
        username: &str,
    ) -> ClientResult<()> {
        let server_url = normalize_server_url(server_url)?;
        self.credentials.clear(&server_url, username).await?;
        Ok(())
    }

    /// Sign out
    ///
    /// The server is told to revoke the token on a best-effort basis; the
    /// local session is cleared regardless. With `forget_credentials` the
    /// saved password is removed as well.
    pub async fn logout(&self, forget_credentials: bool) -> ClientResult<()> {
        let _guard = self.auth_lock.lock().await;

        let Some(current) = self.store.get() else {
            return Ok(());
        };

        if let Some(token) = current.access_token() {
            let revoke = async {
                let client =
                    self.factory.get_client(current.server_url(), token).await?;
                client.logout().await
            };
            match tokio::time::timeout(LOGOUT_TIMEOUT, revoke).await {
                Ok(Ok(())) => debug!("[SessionManager] Server session revoked"),
                Ok(Err(e)) => debug!("[SessionManager] Server logout failed: {}", e),
                Err(_) => debug!("[SessionManager] Server logout timed out"),
            }
        }

        self.store.clear();
        self.factory.invalidate().await;

        if forget_credentials && let Some(username) = current.username() {
            self.credentials
                .clear(current.server_url(), username)
                .await?;
        }
        info!("[SessionManager] Logged out of {}", current.server_url());
        Ok(())
    }

    /// Fail-closed sign out after an unrecoverable authentication failure
    ///
    /// Clears the session only while it still carries `failed_token`, so a
    /// session established meanwhile survives. Returns whether it cleared.
    pub async fn force_logout(&self, failed_token: &str) -> bool {
        if !self.store.clear_if_token(failed_token) {
            return false;
        }
        self.factory.invalidate().await;
        warn!("[SessionManager] Session cleared after authentication failure");
        true
    }

    async fn authenticate(
        &self,
        server_url: &str,
        username: &str,
        password: &SecureCredential,
    ) -> ClientResult<SessionState> {
        let client = self.factory.connect_anonymous(server_url).await?;
        let result = client
            .authenticate_by_name(username, password.expose_secret())
            .await?;
        info!(
            "[SessionManager] Authenticated {} on {}",
            result.user.name, server_url
        );
        Ok(SessionState::authenticated(
            client.server_url(),
            result.user.id,
            username,
            result.access_token,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::testing::{StubServer, StubTransport};

    const URL: &str = "http://media.local";

    fn manager(
        server: &Arc<StubServer>,
    ) -> SessionManager<StubTransport, MemoryCredentialStore> {
        SessionManager::new(
            Arc::new(StubTransport::new(Arc::clone(server))),
            Arc::new(MemoryCredentialStore::new()),
        )
    }

    #[tokio::test]
    async fn login_sets_session_and_saves_credentials() {
        let server = StubServer::new();
        let user_id = server.add_account("alice", "pw");
        let manager = manager(&server);

        let state = manager
            .login("media.local/", "alice", &"pw".into(), true)
            .await
            .unwrap();

        assert_eq!(state.server_url(), URL);
        assert_eq!(state.user_id(), Some(&user_id));
        assert!(manager.session().is_connected());
        assert!(manager.credentials().get(URL, "alice").await.is_some());
    }

    #[tokio::test]
    async fn login_without_remember_saves_nothing() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);

        manager.login(URL, "alice", &"pw".into(), false).await.unwrap();
        assert!(manager.credentials().is_empty());
    }

    #[tokio::test]
    async fn rejected_login_leaves_no_session() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);

        let err = manager
            .login(URL, "alice", &"wrong".into(), true)
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(manager.current().is_none());
        assert!(manager.credentials().is_empty());
    }

    #[tokio::test]
    async fn resume_uses_saved_credentials() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);

        assert_eq!(
            manager.resume(URL, "alice").await.unwrap_err(),
            ClientError::NotAuthenticated
        );

        manager
            .credentials()
            .save(URL, "alice", &"pw".into())
            .await
            .unwrap();
        let state = manager.resume(URL, "alice").await.unwrap();
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn reauthenticate_is_coalesced_for_stale_tokens() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);
        let failed = manager.login(URL, "alice", &"pw".into(), true).await.unwrap();

        let renewed = manager.reauthenticate(&failed).await.unwrap();
        assert_ne!(renewed.access_token(), failed.access_token());
        assert_eq!(server.login_calls(), 2);

        // A second caller holding the same stale token gets the fresh session
        let again = manager.reauthenticate(&failed).await.unwrap();
        assert_eq!(again.access_token(), renewed.access_token());
        assert_eq!(server.login_calls(), 2);
    }

    #[tokio::test]
    async fn reauthenticate_without_credentials_fails() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);
        let state = manager.login(URL, "alice", &"pw".into(), false).await.unwrap();

        let err = manager.reauthenticate(&state).await.unwrap_err();
        assert_eq!(err, ClientError::NotAuthenticated);
        assert_eq!(server.login_calls(), 1);
    }

    #[tokio::test]
    async fn reauthenticate_never_hands_out_another_users_session() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        server.add_account("bob", "pw2");
        let manager = manager(&server);
        let alice = manager.login(URL, "alice", &"pw".into(), true).await.unwrap();
        manager.login(URL, "bob", &"pw2".into(), true).await.unwrap();

        let err = manager.reauthenticate(&alice).await.unwrap_err();
        assert_eq!(err, ClientError::NotAuthenticated);
        assert_eq!(server.login_calls(), 2);
        assert_eq!(manager.current().unwrap().username(), Some("bob"));
    }

    #[tokio::test]
    async fn forget_credentials_normalizes_the_url() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);
        manager
            .login("media.local:8096/", "alice", &"pw".into(), true)
            .await
            .unwrap();
        assert_eq!(manager.credentials().len(), 1);

        manager
            .forget_credentials("media.local:8096/", "alice")
            .await
            .unwrap();
        assert!(manager.credentials().is_empty());
    }

    #[tokio::test]
    async fn logout_revokes_and_clears() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);
        let state = manager.login(URL, "alice", &"pw".into(), true).await.unwrap();
        let token = state.access_token().unwrap().to_string();

        manager.logout(true).await.unwrap();
        assert!(manager.current().is_none());
        assert!(!server.is_token_valid(&token));
        assert_eq!(server.logout_calls(), 1);
        assert!(manager.credentials().get(URL, "alice").await.is_none());
        assert!(!manager.factory().has_cached_client().await);

        // Nothing to do the second time
        manager.logout(true).await.unwrap();
        assert_eq!(server.logout_calls(), 1);
    }

    #[tokio::test]
    async fn force_logout_spares_a_newer_session() {
        let server = StubServer::new();
        server.add_account("alice", "pw");
        let manager = manager(&server);
        manager.login(URL, "alice", &"pw".into(), false).await.unwrap();

        assert!(!manager.force_logout("some-older-token").await);
        assert!(manager.session().is_connected());

        let token = manager.session().access_token().unwrap();
        assert!(manager.force_logout(&token).await);
        assert!(!manager.session().is_connected());
    }

    #[tokio::test]
    async fn server_info_needs_no_session() {
        let server = StubServer::new();
        let manager = manager(&server);
        let info = manager.server_info("media.local").await.unwrap();
        assert_eq!(info.server_name, "Stub");
        assert!(manager.current().is_none());
    }
}
