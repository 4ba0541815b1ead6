use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use url::Url;

use crate::{
    models::{
        ClientConfig, ClientIdentity, ConfigMetadata, DEFAULT_CLIENT_NAME,
        DEFAULT_CONNECT_TIMEOUT, DEFAULT_DEVICE_NAME, DEFAULT_REQUEST_TIMEOUT,
        NetworkConfig, StorageConfig,
    },
    sources::{EnvConfig, FileConfig},
    util::{non_empty, parse_duration},
};

const DEFAULT_CONFIG_LOCATIONS: &[&str] =
    &["lumen.toml", "lumen.json", "config/lumen.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Skip `.env` discovery entirely
    pub ignore_env_file: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: ClientConfig,
    pub warnings: Vec<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn ignore_env_file(mut self) -> Self {
        self.options.ignore_env_file = true;
        self
    }

    /// Load `.env`, then compose file and process environment
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose the file configuration with an explicit environment snapshot
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut warnings = Vec::new();
        if config_path.is_none() {
            warnings.push(
                "No lumen.toml detected; using environment and defaults"
                    .to_string(),
            );
        }
        let config =
            compose_config(file_config.unwrap_or_default(), env, config_path)?;
        for warning in &warnings {
            tracing::debug!("{warning}");
        }
        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if self.options.ignore_env_file {
            return Ok(false);
        }
        let result = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        result.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(ConfigLoadError::EnvFile(err)),
        })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();
        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists());
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        tracing::info!("Loaded client configuration from {}", path.display());
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|source| {
            ConfigLoadError::ParseJson {
                path: path.to_path_buf(),
                source,
            }
        }),
        _ => toml::from_str(&contents).map_err(|source| {
            ConfigLoadError::Parse {
                path: path.to_path_buf(),
                source,
            }
        }),
    }
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<ClientConfig, ConfigLoadError> {
    let FileConfig {
        server_url: file_server_url,
        client: file_client,
        storage: file_storage,
    } = file;

    let server_url = match env.server_url.or(non_empty(file_server_url)) {
        Some(raw) => Some(validate_server_url(&raw)?),
        None => None,
    };

    let device_name = env
        .device_name
        .or(non_empty(file_client.device_name))
        .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
    let explicit_device_id =
        env.device_id.or(non_empty(file_client.device_id));
    let device_id_derived = explicit_device_id.is_none();
    let device_id = explicit_device_id
        .unwrap_or_else(|| ClientIdentity::derived_device_id(&device_name));

    let identity = ClientIdentity {
        client_name: env
            .client_name
            .or(non_empty(file_client.name))
            .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
        client_version: env!("CARGO_PKG_VERSION").to_string(),
        device_name,
        device_id,
    };

    let network = NetworkConfig {
        request_timeout: resolve_duration(
            "request_timeout",
            env.request_timeout.or(file_client.request_timeout),
            DEFAULT_REQUEST_TIMEOUT,
        )?,
        connect_timeout: resolve_duration(
            "connect_timeout",
            env.connect_timeout.or(file_client.connect_timeout),
            DEFAULT_CONNECT_TIMEOUT,
        )?,
        accept_invalid_certs: env
            .accept_invalid_certs
            .or(file_client.accept_invalid_certs)
            .unwrap_or(false),
    };

    let storage = StorageConfig {
        credentials_dir: env
            .credentials_dir
            .or(file_storage.credentials_dir)
            .unwrap_or_else(StorageConfig::default_credentials_dir),
    };

    Ok(ClientConfig {
        server_url,
        identity,
        network,
        storage,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
            device_id_derived,
        },
    })
}

fn resolve_duration(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match non_empty(raw) {
        Some(value) => parse_duration(&value)
            .ok_or(ConfigLoadError::InvalidDuration { field, value }),
        None => Ok(default),
    }
}

/// Only checks that the value is a URL with a host; scheme defaulting and
/// trailing-slash trimming happen when the client connects.
fn validate_server_url(raw: &str) -> Result<String, ConfigLoadError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let parsed = Url::parse(&candidate).map_err(|source| {
        ConfigLoadError::InvalidServerUrl {
            value: raw.to_string(),
            source,
        }
    })?;
    if parsed.host_str().is_none() {
        return Err(ConfigLoadError::InvalidServerUrl {
            value: raw.to_string(),
            source: url::ParseError::EmptyHost,
        });
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse configuration {path}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid server URL '{value}'")]
    InvalidServerUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration { field: &'static str, value: String },
    #[error(transparent)]
    EnvFile(dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}
