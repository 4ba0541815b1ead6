//! reqwest implementation of the transport
//!
//! Every request carries the `MediaBrowser` authorization header naming
//! this client and device; once a token is known it is appended as
//! `Token="..."` and the header is marked sensitive.

use async_trait::async_trait;
use log::{debug, info};
use lumen_config::{ClientConfig, ClientIdentity, NetworkConfig};
use lumen_model::{
    AuthenticateByName, AuthenticationResult, ItemId, ItemQuery, Library,
    MediaItem, PlaybackProgress, QueryResult, ServerInfo, User, UserId,
    UserItemData,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use super::{MediaClient, Transport, normalize_server_url};
use crate::error::{ClientError, ClientResult};

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// Builds [`HttpMediaClient`]s from the configured identity and timeouts
#[derive(Debug, Clone)]
pub struct HttpTransport {
    identity: ClientIdentity,
    network: NetworkConfig,
}

impl HttpTransport {
    pub fn new(identity: ClientIdentity, network: NetworkConfig) -> Self {
        Self { identity, network }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.identity.clone(), config.network.clone())
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// `MediaBrowser Client="..", Device="..", DeviceId="..", Version=".."`
    /// plus `Token=".."` when authenticated
    fn authorization_value(&self, access_token: Option<&str>) -> String {
        let id = &self.identity;
        let mut value = format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\"",
            quote_safe(&id.client_name),
            quote_safe(&id.device_name),
            quote_safe(&id.device_id),
            quote_safe(&id.client_version),
        );
        if let Some(token) = access_token {
            value.push_str(&format!(", Token=\"{}\"", quote_safe(token)));
        }
        value
    }
}

impl Transport for HttpTransport {
    type Client = HttpMediaClient;

    fn connect(
        &self,
        server_url: &str,
        access_token: Option<&str>,
    ) -> Result<Self::Client, ClientError> {
        let base_url = normalize_server_url(server_url)?;

        let mut auth = HeaderValue::from_str(
            &self.authorization_value(access_token),
        )
        .map_err(|e| {
            ClientError::Construction(format!("invalid auth header: {e}"))
        })?;
        if access_token.is_some() {
            auth.set_sensitive(true);
        }
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(self.network.request_timeout)
            .connect_timeout(self.network.connect_timeout)
            .danger_accept_invalid_certs(self.network.accept_invalid_certs)
            .build()
            .map_err(|e| ClientError::Construction(e.to_string()))?;

        info!(
            "[HttpTransport] Built client for {} (authenticated: {})",
            base_url,
            access_token.is_some()
        );

        Ok(HttpMediaClient { http, base_url })
    }
}

/// A reqwest client bound to one server and token
#[derive(Debug, Clone)]
pub struct HttpMediaClient {
    http: Client,
    base_url: String,
}

impl HttpMediaClient {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    async fn send(
        &self,
        request: RequestBuilder,
    ) -> ClientResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        if body.trim().is_empty() {
            body = status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string();
        }
        debug!("[HttpMediaClient] Request failed with {}: {}", status, body);
        Err(ClientError::from_status(status.as_u16(), body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> ClientResult<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> ClientResult<()> {
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl MediaClient for HttpMediaClient {
    fn server_url(&self) -> &str {
        &self.base_url
    }

    async fn server_info(&self) -> ClientResult<ServerInfo> {
        self.send_json(self.request(Method::GET, "System/Info/Public"))
            .await
    }

    async fn authenticate_by_name(
        &self,
        username: &str,
        password: &str,
    ) -> ClientResult<AuthenticationResult> {
        let body = AuthenticateByName {
            username: username.to_string(),
            password: password.to_string(),
        };
        debug!("[HttpMediaClient] {}", body);
        self.send_json(
            self.request(Method::POST, "Users/AuthenticateByName")
                .json(&body),
        )
        .await
    }

    async fn logout(&self) -> ClientResult<()> {
        self.send_empty(self.request(Method::POST, "Sessions/Logout"))
            .await
    }

    async fn current_user(&self) -> ClientResult<User> {
        self.send_json(self.request(Method::GET, "Users/Me")).await
    }

    async fn libraries(
        &self,
        user_id: &UserId,
    ) -> ClientResult<QueryResult<Library>> {
        self.send_json(
            self.request(Method::GET, &format!("Users/{user_id}/Views")),
        )
        .await
    }

    async fn items(
        &self,
        user_id: &UserId,
        query: &ItemQuery,
    ) -> ClientResult<QueryResult<MediaItem>> {
        self.send_json(
            self.request(Method::GET, &format!("Users/{user_id}/Items"))
                .query(&query.to_query_pairs()),
        )
        .await
    }

    async fn item(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> ClientResult<MediaItem> {
        self.send_json(self.request(
            Method::GET,
            &format!("Users/{user_id}/Items/{item_id}"),
        ))
        .await
    }

    async fn latest(
        &self,
        user_id: &UserId,
        parent_id: Option<&ItemId>,
        limit: u32,
    ) -> ClientResult<Vec<MediaItem>> {
        let mut params = vec![("Limit", limit.to_string())];
        if let Some(parent) = parent_id {
            params.push(("ParentId", parent.to_string()));
        }
        self.send_json(
            self.request(
                Method::GET,
                &format!("Users/{user_id}/Items/Latest"),
            )
            .query(&params),
        )
        .await
    }

    async fn resume_items(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> ClientResult<QueryResult<MediaItem>> {
        self.send_json(
            self.request(
                Method::GET,
                &format!("Users/{user_id}/Items/Resume"),
            )
            .query(&[("Limit", limit.to_string())]),
        )
        .await
    }

    async fn set_played(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        played: bool,
    ) -> ClientResult<UserItemData> {
        let method = if played { Method::POST } else { Method::DELETE };
        self.send_json(self.request(
            method,
            &format!("Users/{user_id}/PlayedItems/{item_id}"),
        ))
        .await
    }

    async fn set_favorite(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        favorite: bool,
    ) -> ClientResult<UserItemData> {
        let method = if favorite {
            Method::POST
        } else {
            Method::DELETE
        };
        self.send_json(self.request(
            method,
            &format!("Users/{user_id}/FavoriteItems/{item_id}"),
        ))
        .await
    }

    async fn report_progress(
        &self,
        progress: &PlaybackProgress,
    ) -> ClientResult<()> {
        self.send_empty(
            self.request(Method::POST, "Sessions/Playing/Progress")
                .json(progress),
        )
        .await
    }
}

/// Header parameter values are quoted; drop characters that would break
/// the quoting
fn quote_safe(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect()
}
