//! Scripted in-memory media server
//!
//! [`StubServer`] holds accounts, tokens and a small catalog. A
//! [`StubTransport`] builds [`StubClient`]s against it and records every
//! construction. Tests drive failure paths by expiring tokens, changing
//! passwords or queueing errors for the next calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use lumen_model::{
    AuthenticationResult, ItemId, ItemQuery, Library, MediaItem,
    PlaybackProgress, QueryResult, ServerInfo, User, UserId, UserItemData,
};
use parking_lot::Mutex;

use crate::error::{ClientError, ClientResult};
use crate::transport::{MediaClient, Transport, normalize_server_url};

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
struct ServerState {
    accounts: HashMap<String, Account>,
    /// token -> username
    tokens: HashMap<String, String>,
    next_token: u64,
    libraries: Vec<Library>,
    items: Vec<MediaItem>,
    user_data: HashMap<ItemId, UserItemData>,
    scripted_failures: VecDeque<ClientError>,
    login_failure: Option<ClientError>,
    latency: Duration,
    login_calls: usize,
    logout_calls: usize,
    data_calls: usize,
    progress_reports: Vec<PlaybackProgress>,
}

/// In-memory server state shared by every client built against it
#[derive(Debug, Default)]
pub struct StubServer {
    state: Mutex<ServerState>,
}

impl StubServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an account; returns its user id
    pub fn add_account(&self, username: &str, password: &str) -> UserId {
        let mut state = self.state.lock();
        let id = UserId::new(format!("user-{}", state.accounts.len() + 1));
        let user = User {
            id: id.clone(),
            name: username.to_string(),
            server_id: Some("stub-server".to_string()),
            has_password: !password.is_empty(),
            policy: None,
        };
        state.accounts.insert(
            username.to_string(),
            Account {
                user,
                password: password.to_string(),
            },
        );
        id
    }

    /// Change a password; saved credentials stop working
    pub fn set_password(&self, username: &str, password: &str) {
        if let Some(account) = self.state.lock().accounts.get_mut(username) {
            account.password = password.to_string();
        }
    }

    pub fn add_library(&self, library: Library) {
        self.state.lock().libraries.push(library);
    }

    pub fn add_item(&self, item: MediaItem) {
        let mut state = self.state.lock();
        if let Some(data) = item.user_data.clone() {
            state.user_data.insert(item.id.clone(), data);
        }
        state.items.push(item);
    }

    /// Reject every token issued so far
    pub fn expire_all_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    pub fn expire_token(&self, token: &str) {
        self.state.lock().tokens.remove(token);
    }

    pub fn is_token_valid(&self, token: &str) -> bool {
        self.state.lock().tokens.contains_key(token)
    }

    /// Fail the next data call with `error`, before the token is checked
    pub fn fail_next(&self, error: ClientError) {
        self.state.lock().scripted_failures.push_back(error);
    }

    /// Make every login fail with `error` until cleared
    pub fn set_login_failure(&self, error: Option<ClientError>) {
        self.state.lock().login_failure = error;
    }

    /// Delay applied to every data call
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn login_calls(&self) -> usize {
        self.state.lock().login_calls
    }

    pub fn logout_calls(&self) -> usize {
        self.state.lock().logout_calls
    }

    pub fn data_calls(&self) -> usize {
        self.state.lock().data_calls
    }

    pub fn progress_reports(&self) -> Vec<PlaybackProgress> {
        self.state.lock().progress_reports.clone()
    }

    pub fn user_data(&self, item_id: &ItemId) -> Option<UserItemData> {
        self.state.lock().user_data.get(item_id).cloned()
    }

    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> ClientResult<AuthenticationResult> {
        let mut state = self.state.lock();
        state.login_calls += 1;
        if let Some(error) = state.login_failure.clone() {
            return Err(error);
        }

        let user = match state.accounts.get(username) {
            Some(account) if account.password == password => {
                account.user.clone()
            }
            _ => {
                return Err(ClientError::unauthorized(
                    "Invalid username or password",
                ));
            }
        };

        state.next_token += 1;
        let token = format!("token-{}", state.next_token);
        state.tokens.insert(token.clone(), username.to_string());
        Ok(AuthenticationResult {
            user,
            access_token: token,
            server_id: Some("stub-server".to_string()),
        })
    }

    /// Consume a scripted failure, then check the token
    fn authorize(&self, token: Option<&str>) -> ClientResult<User> {
        let mut state = self.state.lock();
        state.data_calls += 1;
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }

        let username = token
            .and_then(|t| state.tokens.get(t))
            .ok_or_else(|| ClientError::unauthorized("Token expired"))?;
        state
            .accounts
            .get(username)
            .map(|account| account.user.clone())
            .ok_or_else(|| ClientError::unauthorized("Unknown user"))
    }

    fn with_user_data(&self, item: &MediaItem) -> MediaItem {
        let mut item = item.clone();
        item.user_data = self.state.lock().user_data.get(&item.id).cloned();
        item
    }

    fn find_item(&self, item_id: &ItemId) -> ClientResult<MediaItem> {
        let found = self
            .state
            .lock()
            .items
            .iter()
            .find(|item| &item.id == item_id)
            .cloned();
        found
            .map(|item| self.with_user_data(&item))
            .ok_or_else(|| ClientError::NotFound(format!("item {item_id}")))
    }

    fn update_user_data(
        &self,
        item_id: &ItemId,
        update: impl FnOnce(&mut UserItemData),
    ) -> ClientResult<UserItemData> {
        self.find_item(item_id)?;
        let mut state = self.state.lock();
        let data = state.user_data.entry(item_id.clone()).or_default();
        update(data);
        Ok(data.clone())
    }
}

/// One recorded `Transport::connect` call
#[derive(Debug, Clone)]
pub struct ConnectRecord {
    pub server_url: String,
    pub access_token: Option<String>,
    pub thread: ThreadId,
}

/// Transport that builds [`StubClient`]s
#[derive(Debug)]
pub struct StubTransport {
    server: Arc<StubServer>,
    connect_delay: Duration,
    connect_failures: AtomicUsize,
    connects: Mutex<Vec<ConnectRecord>>,
}

impl StubTransport {
    pub fn new(server: Arc<StubServer>) -> Self {
        Self {
            server,
            connect_delay: Duration::ZERO,
            connect_failures: AtomicUsize::new(0),
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Block inside `connect` for `delay`, like a slow TLS handshake
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Fail the next `n` constructions
    pub fn fail_next_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    pub fn server(&self) -> &Arc<StubServer> {
        &self.server
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn connect_log(&self) -> Vec<ConnectRecord> {
        self.connects.lock().clone()
    }
}

impl Transport for StubTransport {
    type Client = StubClient;

    fn connect(
        &self,
        server_url: &str,
        access_token: Option<&str>,
    ) -> Result<Self::Client, ClientError> {
        let server_url = normalize_server_url(server_url)?;
        self.connects.lock().push(ConnectRecord {
            server_url: server_url.clone(),
            access_token: access_token.map(str::to_owned),
            thread: std::thread::current().id(),
        });

        if !self.connect_delay.is_zero() {
            std::thread::sleep(self.connect_delay);
        }

        let failed = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(ClientError::Construction(
                "scripted construction failure".into(),
            ));
        }

        Ok(StubClient {
            server: Arc::clone(&self.server),
            server_url,
            token: access_token.map(str::to_owned),
        })
    }
}

/// Client bound to one token on a [`StubServer`]
#[derive(Debug)]
pub struct StubClient {
    server: Arc<StubServer>,
    server_url: String,
    token: Option<String>,
}

impl StubClient {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    async fn begin(&self) -> ClientResult<User> {
        let latency = self.server.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.server.authorize(self.token.as_deref())
    }
}

#[async_trait]
impl MediaClient for StubClient {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn server_info(&self) -> ClientResult<ServerInfo> {
        Ok(ServerInfo {
            id: "stub-server".to_string(),
            server_name: "Stub".to_string(),
            version: "10.9.0".to_string(),
            product_name: Some("Stub Media Server".to_string()),
            local_address: Some(self.server_url.clone()),
        })
    }

    async fn authenticate_by_name(
        &self,
        username: &str,
        password: &str,
    ) -> ClientResult<AuthenticationResult> {
        self.server.login(username, password)
    }

    async fn logout(&self) -> ClientResult<()> {
        let mut state = self.server.state.lock();
        state.logout_calls += 1;
        if let Some(token) = &self.token {
            state.tokens.remove(token);
        }
        Ok(())
    }

    async fn current_user(&self) -> ClientResult<User> {
        self.begin().await
    }

    async fn libraries(
        &self,
        _user_id: &UserId,
    ) -> ClientResult<QueryResult<Library>> {
        self.begin().await?;
        let libraries = self.server.state.lock().libraries.clone();
        Ok(QueryResult {
            total_record_count: libraries.len() as u32,
            items: libraries,
            start_index: 0,
        })
    }

    async fn items(
        &self,
        _user_id: &UserId,
        query: &ItemQuery,
    ) -> ClientResult<QueryResult<MediaItem>> {
        self.begin().await?;
        let items = self.server.state.lock().items.clone();
        let term = query.search_term.as_deref().map(str::to_lowercase);

        let matching: Vec<MediaItem> = items
            .iter()
            .map(|item| self.server.with_user_data(item))
            .filter(|item| {
                query
                    .parent_id
                    .as_ref()
                    .is_none_or(|p| item.parent_id.as_ref() == Some(p))
            })
            .filter(|item| {
                query.include_item_types.is_empty()
                    || query.include_item_types.contains(&item.item_type)
            })
            .filter(|item| {
                term.as_ref()
                    .is_none_or(|t| item.name.to_lowercase().contains(t))
            })
            .filter(|item| !query.favorites_only || item.is_favorite())
            .collect();

        let start = query.start_index.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(QueryResult {
            total_record_count: matching.len() as u32,
            items: matching.into_iter().skip(start).take(limit).collect(),
            start_index: start as u32,
        })
    }

    async fn item(
        &self,
        _user_id: &UserId,
        item_id: &ItemId,
    ) -> ClientResult<MediaItem> {
        self.begin().await?;
        self.server.find_item(item_id)
    }

    async fn latest(
        &self,
        _user_id: &UserId,
        parent_id: Option<&ItemId>,
        limit: u32,
    ) -> ClientResult<Vec<MediaItem>> {
        self.begin().await?;
        let items = self.server.state.lock().items.clone();
        Ok(items
            .iter()
            .rev()
            .filter(|item| {
                parent_id.is_none_or(|p| item.parent_id.as_ref() == Some(p))
            })
            .take(limit as usize)
            .map(|item| self.server.with_user_data(item))
            .collect())
    }

    async fn resume_items(
        &self,
        _user_id: &UserId,
        limit: u32,
    ) -> ClientResult<QueryResult<MediaItem>> {
        self.begin().await?;
        let items = self.server.state.lock().items.clone();
        let resumable: Vec<MediaItem> = items
            .iter()
            .map(|item| self.server.with_user_data(item))
            .filter(|item| {
                item.user_data
                    .as_ref()
                    .is_some_and(|d| !d.played && d.playback_position_ticks > 0)
            })
            .take(limit as usize)
            .collect();
        Ok(QueryResult {
            total_record_count: resumable.len() as u32,
            items: resumable,
            start_index: 0,
        })
    }

    async fn set_played(
        &self,
        _user_id: &UserId,
        item_id: &ItemId,
        played: bool,
    ) -> ClientResult<UserItemData> {
        self.begin().await?;
        self.server.update_user_data(item_id, |data| {
            data.played = played;
            if played {
                data.play_count += 1;
                data.playback_position_ticks = 0;
                data.last_played_date = Some(chrono::Utc::now());
            }
        })
    }

    async fn set_favorite(
        &self,
        _user_id: &UserId,
        item_id: &ItemId,
        favorite: bool,
    ) -> ClientResult<UserItemData> {
        self.begin().await?;
        self.server
            .update_user_data(item_id, |data| data.is_favorite = favorite)
    }

    async fn report_progress(
        &self,
        progress: &PlaybackProgress,
    ) -> ClientResult<()> {
        self.begin().await?;
        self.server.update_user_data(&progress.item_id, |data| {
            data.playback_position_ticks = progress.position_ticks;
        })?;
        self.server
            .state
            .lock()
            .progress_reports
            .push(progress.clone());
        Ok(())
    }
}
