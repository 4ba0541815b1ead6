//! Cached transport client per (server URL, access token)
//!
//! The factory owns one async mutex that guards the cache slot. Whoever
//! holds it either finds a client for its key or builds one, so callers
//! racing on the same key produce a single construction. Invalidation takes
//! the same lock and is therefore atomic with respect to `get_client`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::ClientError;
use crate::transport::{Transport, normalize_server_url};

#[derive(Clone, PartialEq, Eq)]
struct ClientKey {
    server_url: String,
    access_token: String,
}

struct CachedClient<C> {
    key: ClientKey,
    client: Arc<C>,
}

pub struct ClientFactory<T: Transport> {
    transport: Arc<T>,
    slot: Mutex<Option<CachedClient<T::Client>>>,
    constructions: AtomicUsize,
}

impl<T: Transport> fmt::Debug for ClientFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached_for = self
            .slot
            .try_lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|c| c.key.server_url.clone()));
        f.debug_struct("ClientFactory")
            .field("cached_for", &cached_for)
            .field("constructions", &self.construction_count())
            .finish()
    }
}

impl<T: Transport> ClientFactory<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            slot: Mutex::new(None),
            constructions: AtomicUsize::new(0),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Client bound to `server_url` and `access_token`
    ///
    /// Returns the cached client when its key matches; otherwise evicts it
    /// and builds a new one on the blocking pool. Failed constructions are
    /// not cached.
    pub async fn get_client(
        &self,
        server_url: &str,
        access_token: &str,
    ) -> Result<Arc<T::Client>, ClientError> {
        let key = ClientKey {
            server_url: normalize_server_url(server_url)?,
            access_token: access_token.to_string(),
        };

        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.key == key {
                return Ok(Arc::clone(&cached.client));
            }
            info!(
                "[ClientFactory] Evicting client for {} (session changed)",
                cached.key.server_url
            );
            *slot = None;
        }

        self.constructions.fetch_add(1, Ordering::SeqCst);
        debug!("[ClientFactory] Constructing client for {}", key.server_url);
        let client =
            Arc::new(self.construct(&key.server_url, Some(access_token)).await?);
        *slot = Some(CachedClient {
            key,
            client: Arc::clone(&client),
        });
        Ok(client)
    }

    /// Uncached client without a token, for public endpoints and login
    pub async fn connect_anonymous(
        &self,
        server_url: &str,
    ) -> Result<T::Client, ClientError> {
        let server_url = normalize_server_url(server_url)?;
        self.construct(&server_url, None).await
    }

    /// Drop the cached client; the next `get_client` builds a fresh one
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.take() {
            info!(
                "[ClientFactory] Invalidated client for {}",
                cached.key.server_url
            );
        }
    }

    pub async fn has_cached_client(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of cached clients built so far
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    async fn construct(
        &self,
        server_url: &str,
        access_token: Option<&str>,
    ) -> Result<T::Client, ClientError> {
        let transport = Arc::clone(&self.transport);
        let server_url = server_url.to_string();
        let access_token = access_token.map(str::to_owned);

        tokio::task::spawn_blocking(move || {
            transport.connect(&server_url, access_token.as_deref())
        })
        .await
        .map_err(|e| {
            ClientError::Construction(format!("construction task failed: {e}"))
        })?
    }
}
