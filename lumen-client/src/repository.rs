//! Domain facade over the media server
//!
//! Every call is routed through the [`AuthRetryExecutor`]; nothing here
//! holds a transport client. Errors are translated into
//! [`RepositoryError`] without further recovery.

use std::fmt;

use lumen_model::{
    ItemId, ItemQuery, Library, LibraryId, MediaItem, PlaybackProgress,
    QueryResult, User, UserItemData,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::error::{ClientError, ClientResult};
use crate::executor::{AuthRetryExecutor, SessionClient};
use crate::transport::{MediaClient, Transport};

pub const LATEST_LIMIT: u32 = 16;
pub const CONTINUE_WATCHING_LIMIT: u32 = 12;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Sign in required")]
    SignInRequired,

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Server error: {0}")]
    ServerFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Could not connect: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    QueryFailed(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<ClientError> for RepositoryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotAuthenticated => RepositoryError::SignInRequired,
            ClientError::Authentication { .. } => RepositoryError::SessionExpired,
            ClientError::Network(msg) => RepositoryError::Unreachable(msg),
            ClientError::Server { status, message } => {
                RepositoryError::ServerFailure(format!("{status}: {message}"))
            }
            ClientError::Unexpected { status, message } => {
                RepositoryError::ServerFailure(format!("{status}: {message}"))
            }
            ClientError::NotFound(msg) => RepositoryError::NotFound(msg),
            ClientError::Cancelled => RepositoryError::Cancelled,
            err @ (ClientError::Construction(_)
            | ClientError::InvalidServerUrl(_)) => {
                RepositoryError::Connection(err.to_string())
            }
            err @ (ClientError::Decode(_) | ClientError::Storage(_)) => {
                RepositoryError::QueryFailed(err.to_string())
            }
        }
    }
}

pub struct MediaRepository<T: Transport, S: CredentialStore> {
    executor: AuthRetryExecutor<T, S>,
    cancel: Option<CancellationToken>,
}

impl<T: Transport, S: CredentialStore> Clone for MediaRepository<T, S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Transport, S: CredentialStore> fmt::Debug for MediaRepository<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaRepository")
            .field("executor", &self.executor)
            .field("scoped", &self.cancel.is_some())
            .finish()
    }
}

impl<T: Transport, S: CredentialStore> MediaRepository<T, S> {
    pub fn new(executor: AuthRetryExecutor<T, S>) -> Self {
        Self {
            executor,
            cancel: None,
        }
    }

    /// Copy whose calls end with [`RepositoryError::Cancelled`] once
    /// `cancel` fires
    pub fn scoped(&self, cancel: CancellationToken) -> Self {
        Self {
            executor: self.executor.clone(),
            cancel: Some(cancel),
        }
    }

    pub fn executor(&self) -> &AuthRetryExecutor<T, S> {
        &self.executor
    }

    async fn run<R, F, Fut>(&self, op: F) -> RepositoryResult<R>
    where
        F: Fn(SessionClient<T::Client>) -> Fut,
        Fut: Future<Output = ClientResult<R>>,
    {
        let result = match &self.cancel {
            Some(cancel) => self.executor.execute_cancellable(cancel, op).await,
            None => self.executor.execute(op).await,
        };
        result.map_err(|e| {
            log::debug!("[MediaRepository] {} error: {}", e.kind(), e);
            RepositoryError::from(e)
        })
    }

    pub async fn current_user(&self) -> RepositoryResult<User> {
        self.run(|c| async move { c.current_user().await }).await
    }

    pub async fn libraries(&self) -> RepositoryResult<Vec<Library>> {
        self.run(|c| async move {
            Ok(c.libraries(c.user_id()?).await?.items)
        })
        .await
    }

    /// Items directly under a library, filtered by `query`
    pub async fn library_items(
        &self,
        library_id: &LibraryId,
        query: ItemQuery,
    ) -> RepositoryResult<QueryResult<MediaItem>> {
        let query = query.parent(library_id.clone());
        self.run(|c| {
            let query = query.clone();
            async move { c.items(c.user_id()?, &query).await }
        })
        .await
    }

    pub async fn item(&self, item_id: &ItemId) -> RepositoryResult<MediaItem> {
        self.run(|c| async move { c.item(c.user_id()?, item_id).await })
            .await
    }

    /// Recursive name search; a blank term matches nothing
    pub async fn search(
        &self,
        term: &str,
        limit: u32,
    ) -> RepositoryResult<Vec<MediaItem>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let query = ItemQuery::new().search(term).recursive(true).limit(limit);
        self.run(|c| {
            let query = query.clone();
            async move { Ok(c.items(c.user_id()?, &query).await?.items) }
        })
        .await
    }

    /// Recently added items of a library
    pub async fn latest(
        &self,
        library_id: &LibraryId,
    ) -> RepositoryResult<Vec<MediaItem>> {
        let parent = ItemId::from(library_id.clone());
        self.run(|c| {
            let parent = parent.clone();
            async move {
                c.latest(c.user_id()?, Some(&parent), LATEST_LIMIT).await
            }
        })
        .await
    }

    pub async fn continue_watching(&self) -> RepositoryResult<Vec<MediaItem>> {
        self.run(|c| async move {
            Ok(c.resume_items(c.user_id()?, CONTINUE_WATCHING_LIMIT)
                .await?
                .items)
        })
        .await
    }

    pub async fn mark_watched(
        &self,
        item_id: &ItemId,
    ) -> RepositoryResult<UserItemData> {
        self.set_played(item_id, true).await
    }

    pub async fn mark_unwatched(
        &self,
        item_id: &ItemId,
    ) -> RepositoryResult<UserItemData> {
        self.set_played(item_id, false).await
    }

    pub async fn toggle_favorite(
        &self,
        item_id: &ItemId,
        favorite: bool,
    ) -> RepositoryResult<UserItemData> {
        self.run(|c| async move {
            c.set_favorite(c.user_id()?, item_id, favorite).await
        })
        .await
    }

    pub async fn report_progress(
        &self,
        progress: &PlaybackProgress,
    ) -> RepositoryResult<()> {
        self.run(|c| async move { c.report_progress(progress).await })
            .await
    }

    async fn set_played(
        &self,
        item_id: &ItemId,
        played: bool,
    ) -> RepositoryResult<UserItemData> {
        self.run(|c| async move {
            c.set_played(c.user_id()?, item_id, played).await
        })
        .await
    }
}
