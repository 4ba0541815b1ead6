//! Client error taxonomy
//!
//! Every failure the session layer can report is a [`ClientError`]. Only the
//! [`AuthRetryExecutor`](crate::executor::AuthRetryExecutor) recovers from
//! [`ClientError::Authentication`]; every other kind passes straight through
//! to the caller.

use thiserror::Error;

use crate::credentials::CredentialError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// No session exists; nothing was sent to the server
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The server rejected the presented token or credentials
    #[error("Authentication rejected ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// Connectivity, DNS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// 5xx response
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller gave up; never retried and never wrapped
    #[error("Operation cancelled")]
    Cancelled,

    /// The transport client could not be built
    #[error("Failed to construct client: {0}")]
    Construction(String),

    #[error("Invalid server URL '{0}'")]
    InvalidServerUrl(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Any other non-success status
    #[error("Unexpected response ({status}): {message}")]
    Unexpected { status: u16, message: String },

    #[error("Credential storage error: {0}")]
    Storage(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => ClientError::Authentication { status, message },
            404 => ClientError::NotFound(message),
            500..=599 => ClientError::Server { status, message },
            _ => ClientError::Unexpected { status, message },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ClientError::Authentication {
            status: 401,
            message: message.into(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// Construction-class errors are raised before any request is sent
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            ClientError::Construction(_) | ClientError::InvalidServerUrl(_)
        )
    }

    /// Short stable name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::NotAuthenticated => "not_authenticated",
            ClientError::Authentication { .. } => "authentication",
            ClientError::Network(_) => "network",
            ClientError::Server { .. } => "server",
            ClientError::NotFound(_) => "not_found",
            ClientError::Cancelled => "cancelled",
            ClientError::Construction(_) => "construction",
            ClientError::InvalidServerUrl(_) => "invalid_server_url",
            ClientError::Decode(_) => "decode",
            ClientError::Unexpected { .. } => "unexpected",
            ClientError::Storage(_) => "storage",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return ClientError::Construction(err.to_string());
        }
        if err.is_decode() {
            return ClientError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return ClientError::from_status(status.as_u16(), err.to_string());
        }
        ClientError::Network(err.to_string())
    }
}

impl From<CredentialError> for ClientError {
    fn from(err: CredentialError) -> Self {
        ClientError::Storage(err.to_string())
    }
}
