use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{non_empty, parse_bool};

/// Raw configuration as defined in a TOML or JSON file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default)]
    pub client: FileClientConfig,
    #[serde(default)]
    pub storage: FileStorageConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Humantime string, e.g. `"30s"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_invalid_certs: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_dir: Option<PathBuf>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub client_name: Option<String>,
    pub device_name: Option<String>,
    pub device_id: Option<String>,
    pub request_timeout: Option<String>,
    pub connect_timeout: Option<String>,
    pub accept_invalid_certs: Option<bool>,
    pub credentials_dir: Option<PathBuf>,
}

impl EnvConfig {
    /// Read `LUMEN_*` variables from the process environment
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup, so callers can layer maps or tests
    /// can avoid touching the process environment
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_empty(lookup(name));
        Self {
            config_path: get("LUMEN_CONFIG_PATH").map(PathBuf::from),
            server_url: get("LUMEN_SERVER_URL"),
            client_name: get("LUMEN_CLIENT_NAME"),
            device_name: get("LUMEN_DEVICE_NAME"),
            device_id: get("LUMEN_DEVICE_ID"),
            request_timeout: get("LUMEN_REQUEST_TIMEOUT"),
            connect_timeout: get("LUMEN_CONNECT_TIMEOUT"),
            accept_invalid_certs: get("LUMEN_ACCEPT_INVALID_CERTS")
                .and_then(|raw| parse_bool(&raw)),
            credentials_dir: get("LUMEN_CREDENTIALS_DIR").map(PathBuf::from),
        }
    }
}
