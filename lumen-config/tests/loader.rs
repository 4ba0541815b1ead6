use std::collections::HashMap;
use std::time::Duration;

use lumen_config::{ConfigLoadError, ConfigLoader, EnvConfig};
use tempfile::TempDir;

fn env_from(pairs: &[(&str, &str)]) -> EnvConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvConfig::from_lookup(|name| map.get(name).cloned())
}

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn file_values_are_applied() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "lumen.toml",
        r#"
server_url = "https://media.example.com/"

[client]
name = "Lumen Test"
device_name = "living-room"
request_timeout = "45s"
accept_invalid_certs = true

[storage]
credentials_dir = "/tmp/lumen-creds"
"#,
    );

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap();
    let config = load.config;

    assert_eq!(
        config.server_url.as_deref(),
        Some("https://media.example.com/")
    );
    assert_eq!(config.identity.client_name, "Lumen Test");
    assert_eq!(config.identity.device_name, "living-room");
    assert_eq!(config.network.request_timeout, Duration::from_secs(45));
    assert_eq!(config.network.connect_timeout, Duration::from_secs(10));
    assert!(config.network.accept_invalid_certs);
    assert_eq!(
        config.storage.credentials_dir,
        std::path::PathBuf::from("/tmp/lumen-creds")
    );
    assert_eq!(config.metadata.config_path, Some(path));
    assert!(load.warnings.is_empty());
}

#[test]
fn environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "lumen.toml",
        r#"
server_url = "https://file.example.com"
[client]
device_name = "file-device"
"#,
    );
    let env = env_from(&[
        ("LUMEN_SERVER_URL", "http://env.example.com:8096"),
        ("LUMEN_DEVICE_NAME", "env-device"),
        ("LUMEN_DEVICE_ID", "abc123"),
        ("LUMEN_ACCEPT_INVALID_CERTS", "on"),
        ("LUMEN_CONNECT_TIMEOUT", "2s"),
    ]);

    let config = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env)
        .unwrap()
        .config;

    assert_eq!(
        config.server_url.as_deref(),
        Some("http://env.example.com:8096")
    );
    assert_eq!(config.identity.device_name, "env-device");
    assert_eq!(config.identity.device_id, "abc123");
    assert!(!config.metadata.device_id_derived);
    assert!(config.network.accept_invalid_certs);
    assert_eq!(config.network.connect_timeout, Duration::from_secs(2));
}

#[test]
fn derived_device_id_is_stable() {
    let env = env_from(&[("LUMEN_DEVICE_NAME", "kitchen")]);
    let first = ConfigLoader::new()
        .load_with_env(env.clone())
        .unwrap()
        .config;
    let second = ConfigLoader::new().load_with_env(env).unwrap().config;

    assert!(first.metadata.device_id_derived);
    assert_eq!(first.identity.device_id, second.identity.device_id);
    assert_eq!(first.identity.device_id.len(), 32);
}

#[test]
fn json_config_is_supported() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "lumen.json",
        r#"{"server_url": "media.local:8096", "client": {"name": "Json"}}"#,
    );
    let config = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap()
        .config;
    assert_eq!(config.server_url.as_deref(), Some("media.local:8096"));
    assert_eq!(config.identity.client_name, "Json");
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("nope.toml"))
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn env_config_path_missing_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    let env = env_from(&[("LUMEN_CONFIG_PATH", missing.to_str().unwrap())]);
    let err = ConfigLoader::new().load_with_env(env).unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn invalid_values_are_rejected() {
    let env = env_from(&[("LUMEN_REQUEST_TIMEOUT", "eventually")]);
    let err = ConfigLoader::new().load_with_env(env).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::InvalidDuration {
            field: "request_timeout",
            ..
        }
    ));

    let env = env_from(&[("LUMEN_SERVER_URL", "http://")]);
    let err = ConfigLoader::new().load_with_env(env).unwrap_err();
    assert!(matches!(err, ConfigLoadError::InvalidServerUrl { .. }));
}

#[test]
fn malformed_toml_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "lumen.toml", "server_url = [");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    match err {
        ConfigLoadError::Parse { path: reported, .. } => {
            assert_eq!(reported, path)
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn defaults_without_any_source() {
    let load = ConfigLoader::new()
        .load_with_env(EnvConfig::default())
        .unwrap();
    assert!(load.config.server_url.is_none());
    assert_eq!(load.config.identity.client_name, "Lumen");
    assert_eq!(load.warnings.len(), 1);
}
