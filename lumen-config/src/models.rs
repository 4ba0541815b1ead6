use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

pub const DEFAULT_CLIENT_NAME: &str = "Lumen";
pub const DEFAULT_DEVICE_NAME: &str = "lumen";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Effective client configuration after file and environment layering
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server to use when a command does not name one
    pub server_url: Option<String>,
    pub identity: ClientIdentity,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub metadata: ConfigMetadata,
}

/// How this client introduces itself to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_name: String,
    pub client_version: String,
    pub device_name: String,
    pub device_id: String,
}

impl ClientIdentity {
    /// Stable device id derived from the device name when none is configured
    pub fn derived_device_id(device_name: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, device_name.as_bytes())
            .simple()
            .to_string()
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            device_id: Self::derived_device_id(DEFAULT_DEVICE_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Accept self-signed certificates (home servers behind a LAN cert)
    pub accept_invalid_certs: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub credentials_dir: PathBuf,
}

impl StorageConfig {
    pub fn default_credentials_dir() -> PathBuf {
        directories::ProjectDirs::from("", "lumen", "lumen")
            .map(|dirs| dirs.data_dir().join("credentials"))
            .unwrap_or_else(|| PathBuf::from("./.lumen/credentials"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_dir: Self::default_credentials_dir(),
        }
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
    pub device_id_derived: bool,
}
