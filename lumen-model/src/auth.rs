use serde::{Deserialize, Serialize};

use crate::user::User;

/// Username/password login body
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateByName {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Pw")]
    pub password: String,
}

/// Successful login payload returned by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResult {
    pub user: User,
    pub access_token: String,
    #[serde(default)]
    pub server_id: Option<String>,
}

impl std::fmt::Display for AuthenticateByName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthenticateByName({})", self.username)
    }
}
