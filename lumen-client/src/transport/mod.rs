//! Boundary to the media server
//!
//! A [`Transport`] builds clients; a [`MediaClient`] is bound to one
//! (server URL, access token) pair for its whole life. Nothing above this
//! module knows about HTTP.

mod http;

pub use http::{HttpMediaClient, HttpTransport};

use async_trait::async_trait;
use lumen_model::{
    AuthenticationResult, ItemId, ItemQuery, Library, MediaItem,
    PlaybackProgress, QueryResult, ServerInfo, User, UserId, UserItemData,
};

use crate::error::{ClientError, ClientResult};

/// Builds transport clients
///
/// `connect` may block (TLS setup, certificate loading); callers run it on
/// the blocking pool.
pub trait Transport: Send + Sync + 'static {
    type Client: MediaClient;

    fn connect(
        &self,
        server_url: &str,
        access_token: Option<&str>,
    ) -> Result<Self::Client, ClientError>;
}

/// Calls a connected client can issue
#[async_trait]
pub trait MediaClient: Send + Sync + 'static {
    /// Normalized URL this client was built for
    fn server_url(&self) -> &str;

    /// Public endpoint; works without a token
    async fn server_info(&self) -> ClientResult<ServerInfo>;

    async fn authenticate_by_name(
        &self,
        username: &str,
        password: &str,
    ) -> ClientResult<AuthenticationResult>;

    /// Revoke the token this client carries
    async fn logout(&self) -> ClientResult<()>;

    async fn current_user(&self) -> ClientResult<User>;

    /// Top-level libraries ("views") visible to the user
    async fn libraries(
        &self,
        user_id: &UserId,
    ) -> ClientResult<QueryResult<Library>>;

    async fn items(
        &self,
        user_id: &UserId,
        query: &ItemQuery,
    ) -> ClientResult<QueryResult<MediaItem>>;

    async fn item(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> ClientResult<MediaItem>;

    async fn latest(
        &self,
        user_id: &UserId,
        parent_id: Option<&ItemId>,
        limit: u32,
    ) -> ClientResult<Vec<MediaItem>>;

    /// Partially watched items
    async fn resume_items(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> ClientResult<QueryResult<MediaItem>>;

    async fn set_played(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        played: bool,
    ) -> ClientResult<UserItemData>;

    async fn set_favorite(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        favorite: bool,
    ) -> ClientResult<UserItemData>;

    async fn report_progress(
        &self,
        progress: &PlaybackProgress,
    ) -> ClientResult<()>;
}

/// Normalize a user-supplied server address
///
/// Trims whitespace and trailing slashes and prepends `http://` when no
/// scheme is given, so `media.local:8096/` and `http://media.local:8096`
/// name the same server. The result must parse as an http(s) URL with a
/// host.
pub fn normalize_server_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidServerUrl(raw.to_string()));
    }

    let with_scheme =
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.contains("://") {
            return Err(ClientError::InvalidServerUrl(raw.to_string()));
        } else {
            format!("http://{}", trimmed)
        };

    let parsed = url::Url::parse(&with_scheme)
        .map_err(|_| ClientError::InvalidServerUrl(raw.to_string()))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ClientError::InvalidServerUrl(raw.to_string()));
    }

    if with_scheme != raw {
        log::debug!(
            "[Transport] Normalized server URL from '{}' to '{}'",
            raw,
            with_scheme
        );
    }
    Ok(with_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_scheme_and_trims() {
        assert_eq!(
            normalize_server_url("  media.local:8096/ ").unwrap(),
            "http://media.local:8096"
        );
        assert_eq!(
            normalize_server_url("https://media.example.com//").unwrap(),
            "https://media.example.com"
        );
        assert_eq!(
            normalize_server_url("http://10.0.0.2:8096/jellyfin/").unwrap(),
            "http://10.0.0.2:8096/jellyfin"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_server_url("media.local/").unwrap();
        assert_eq!(normalize_server_url(&once).unwrap(), once);
    }

    #[test]
    fn rejects_unusable_addresses() {
        for raw in ["", "   ", "/", "ftp://media.local", "http://:8096"] {
            assert!(
                matches!(
                    normalize_server_url(raw),
                    Err(ClientError::InvalidServerUrl(_))
                ),
                "{raw:?} should be rejected"
            );
        }
    }
}
