//! File-backed credential store
//!
//! One `<key>.cred` JSON envelope per (server URL, username) pair, encrypted
//! with AES-256-GCM. The cipher key is derived via HKDF-SHA256 from a random
//! wrap key kept next to the records (`credential_wrap.key`, mode 0600). The
//! record key is bound into each ciphertext as associated data, so a record
//! copied under another key's filename fails to decrypt.

use std::path::{Path, PathBuf};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::{
    CredentialError, CredentialStore, SecureCredential, credential_key,
};

pub(crate) const WRAP_KEY_FILE: &str = "credential_wrap.key";
pub(crate) const RECORD_EXTENSION: &str = "cred";
const RECORD_VERSION: u32 = 1;
const NONCE_SIZE: usize = 12;
const WRAP_KEY_SIZE: usize = 32;
const HKDF_INFO: &[u8] = b"lumen-credentials-v1";

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedRecord {
    /// Base64 encoded nonce
    nonce: String,
    /// Base64 encoded ciphertext
    ciphertext: String,
    encrypted_at: DateTime<Utc>,
    version: u32,
}

#[derive(Debug)]
pub struct EncryptedCredentialStore {
    dir: PathBuf,
    /// Serializes wrap key creation
    wrap_key_lock: Mutex<()>,
}

impl EncryptedCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            wrap_key_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn wrap_key_path(&self) -> PathBuf {
        self.dir.join(WRAP_KEY_FILE)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    /// Read the wrap key, creating it when `create` is set and none exists
    async fn wrap_key(
        &self,
        create: bool,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, CredentialError> {
        let _guard = self.wrap_key_lock.lock().await;
        let path = self.wrap_key_path();

        match tokio::fs::read(&path).await {
            Ok(bytes) => return Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CredentialError::ReadFailed(e)),
        }
        if !create {
            return Ok(None);
        }

        let mut key = Zeroizing::new(vec![0u8; WRAP_KEY_SIZE]);
        getrandom::fill(key.as_mut_slice())
            .map_err(|e| CredentialError::Rng(e.to_string()))?;
        write_private(&path, key.as_slice()).await?;
        log::info!("[CredentialStore] Created wrap key at {:?}", path);
        Ok(Some(key))
    }

    fn cipher(wrap_key: &[u8]) -> Result<Aes256Gcm, CredentialError> {
        let hk = hkdf::Hkdf::<sha2::Sha256>::new(None, wrap_key);
        let mut okm = Zeroizing::new([0u8; 32]);
        hk.expand(HKDF_INFO, okm.as_mut_slice())
            .map_err(|_| CredentialError::KeyDerivationFailed)?;
        Aes256Gcm::new_from_slice(okm.as_slice())
            .map_err(|_| CredentialError::KeyDerivationFailed)
    }

    async fn load(
        &self,
        key: &str,
    ) -> Result<Option<SecureCredential>, CredentialError> {
        let path = self.record_path(key);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[CredentialStore] No record at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(CredentialError::ReadFailed(e)),
        };

        let record: EncryptedRecord = serde_json::from_str(&json)
            .map_err(|e| CredentialError::Corrupt(e.to_string()))?;
        if record.version != RECORD_VERSION {
            return Err(CredentialError::Corrupt(format!(
                "unsupported record version {}",
                record.version
            )));
        }

        let nonce_bytes = BASE64
            .decode(&record.nonce)
            .map_err(|e| CredentialError::Corrupt(e.to_string()))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CredentialError::Corrupt(format!(
                "invalid nonce length: expected {} bytes, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            )));
        }
        let ciphertext = BASE64
            .decode(&record.ciphertext)
            .map_err(|e| CredentialError::Corrupt(e.to_string()))?;

        let Some(wrap_key) = self.wrap_key(false).await? else {
            return Err(CredentialError::Corrupt(
                "record present but wrap key missing".into(),
            ));
        };
        let cipher = Self::cipher(&wrap_key)?;

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext.as_ref(),
                    aad: key.as_bytes(),
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| {
                CredentialError::Corrupt("authentication tag mismatch".into())
            })?;

        let secret = std::str::from_utf8(&plaintext)
            .map_err(|e| CredentialError::Corrupt(e.to_string()))?;
        Ok(Some(SecureCredential::from(secret)))
    }
}

#[async_trait]
impl CredentialStore for EncryptedCredentialStore {
    async fn save(
        &self,
        server_url: &str,
        username: &str,
        secret: &SecureCredential,
    ) -> Result<(), CredentialError> {
        let key = credential_key(server_url, username);
        let wrap_key = self
            .wrap_key(true)
            .await?
            .ok_or(CredentialError::KeyDerivationFailed)?;
        let cipher = Self::cipher(&wrap_key)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: secret.as_bytes(),
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| CredentialError::EncryptionFailed)?;

        let record = EncryptedRecord {
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            encrypted_at: Utc::now(),
            version: RECORD_VERSION,
        };
        let json = serde_json::to_string_pretty(&record)?;

        let path = self.record_path(&key);
        write_private(&path, json.as_bytes()).await?;
        log::info!("[CredentialStore] Saved credentials for {}", key);
        Ok(())
    }

    async fn get(
        &self,
        server_url: &str,
        username: &str,
    ) -> Option<SecureCredential> {
        let key = credential_key(server_url, username);
        match self.load(&key).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!(
                    "[CredentialStore] Ignoring unreadable record {}: {}",
                    key,
                    e
                );
                None
            }
        }
    }

    async fn clear(
        &self,
        server_url: &str,
        username: &str,
    ) -> Result<(), CredentialError> {
        let key = credential_key(server_url, username);
        match tokio::fs::remove_file(self.record_path(&key)).await {
            Ok(()) => {
                log::info!("[CredentialStore] Cleared credentials for {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialError::WriteFailed(e)),
        }
    }

    async fn clear_all(&self) -> Result<(), CredentialError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(());
            }
            Err(e) => return Err(CredentialError::ReadFailed(e)),
        };

        let mut removed = 0usize;
        while let Some(entry) =
            entries.next_entry().await.map_err(CredentialError::ReadFailed)?
        {
            let path = entry.path();
            let is_record = path
                .extension()
                .is_some_and(|ext| ext == RECORD_EXTENSION);
            let is_wrap_key =
                path.file_name() == Some(std::ffi::OsStr::new(WRAP_KEY_FILE));
            if is_record || is_wrap_key {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(CredentialError::WriteFailed)?;
                removed += 1;
            }
        }
        log::info!(
            "[CredentialStore] Cleared {} files from {:?}",
            removed,
            self.dir
        );
        Ok(())
    }
}

/// Write `bytes` to a sibling temp file with owner-only permissions, then
/// rename it over `path`
async fn write_private(
    path: &Path,
    bytes: &[u8],
) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(CredentialError::WriteFailed)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(CredentialError::WriteFailed)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp, perms)
            .await
            .map_err(CredentialError::WriteFailed)?;
    }
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(CredentialError::WriteFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://media.local:8096";

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());

        store
            .save(URL, "alice", &SecureCredential::from("hunter2"))
            .await
            .unwrap();

        let loaded = store.get(URL, "alice").await.unwrap();
        assert_eq!(loaded.expose_secret(), "hunter2");
        assert!(store.get(URL, "bob").await.is_none());
    }

    #[tokio::test]
    async fn record_never_contains_plaintext() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        store
            .save(URL, "alice", &SecureCredential::from("hunter2"))
            .await
            .unwrap();

        let path = store.record_path(&credential_key(URL, "alice"));
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!raw.contains("hunter2"));
        let record: EncryptedRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.version, RECORD_VERSION);
    }

    #[tokio::test]
    async fn overwrite_replaces_secret() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        store
            .save(URL, "alice", &SecureCredential::from("old"))
            .await
            .unwrap();
        store
            .save(URL, "alice", &SecureCredential::from("new"))
            .await
            .unwrap();

        let loaded = store.get(URL, "alice").await.unwrap();
        assert_eq!(loaded.expose_secret(), "new");
    }

    #[tokio::test]
    async fn corrupted_record_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        store
            .save(URL, "alice", &SecureCredential::from("hunter2"))
            .await
            .unwrap();

        let path = store.record_path(&credential_key(URL, "alice"));
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(store.get(URL, "alice").await.is_none());

        // Valid envelope, garbage ciphertext
        let bogus = serde_json::json!({
            "nonce": "AAAAAAAAAAAAAAAA",
            "ciphertext": "AQIDBAUGBwgJCgsMDQ4P",
            "encrypted_at": Utc::now(),
            "version": RECORD_VERSION
        });
        tokio::fs::write(&path, bogus.to_string()).await.unwrap();
        assert!(store.get(URL, "alice").await.is_none());
    }

    #[tokio::test]
    async fn replaced_wrap_key_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        store
            .save(URL, "alice", &SecureCredential::from("hunter2"))
            .await
            .unwrap();

        tokio::fs::write(temp_dir.path().join(WRAP_KEY_FILE), [7u8; 32])
            .await
            .unwrap();
        assert!(store.get(URL, "alice").await.is_none());
    }

    #[tokio::test]
    async fn record_moved_to_another_key_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        store
            .save(URL, "alice", &SecureCredential::from("hunter2"))
            .await
            .unwrap();

        let from = store.record_path(&credential_key(URL, "alice"));
        let to = store.record_path(&credential_key(URL, "mallory"));
        tokio::fs::copy(&from, &to).await.unwrap();

        assert!(store.get(URL, "mallory").await.is_none());
        assert!(store.get(URL, "alice").await.is_some());
    }

    #[tokio::test]
    async fn clear_and_clear_all() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        for user in ["alice", "bob", "carol"] {
            store
                .save(URL, user, &SecureCredential::from("pw"))
                .await
                .unwrap();
        }

        store.clear(URL, "alice").await.unwrap();
        // Clearing twice is fine
        store.clear(URL, "alice").await.unwrap();
        assert!(store.get(URL, "alice").await.is_none());
        assert!(store.get(URL, "bob").await.is_some());

        store.clear_all().await.unwrap();
        assert!(store.get(URL, "bob").await.is_none());
        assert!(store.get(URL, "carol").await.is_none());
        assert!(!temp_dir.path().join(WRAP_KEY_FILE).exists());
    }

    #[tokio::test]
    async fn clear_all_on_missing_dir_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            EncryptedCredentialStore::new(temp_dir.path().join("nested"));
        store.clear_all().await.unwrap();
        assert!(store.get(URL, "alice").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedCredentialStore::new(temp_dir.path());
        store
            .save(URL, "alice", &SecureCredential::from("hunter2"))
            .await
            .unwrap();

        for path in [
            temp_dir.path().join(WRAP_KEY_FILE),
            store.record_path(&credential_key(URL, "alice")),
        ] {
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{path:?}");
        }
    }
}
