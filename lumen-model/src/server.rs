use serde::{Deserialize, Serialize};

/// Public server description, reachable without authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    pub id: String,
    pub server_name: String,
    pub version: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub local_address: Option<String>,
}
