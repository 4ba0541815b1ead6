//! Saved login credentials
//!
//! Passwords are kept so that an expired session can be renewed without
//! asking the user again. Records are keyed by [`credential_key`] over the
//! (server URL, username) pair.
//!
//! Reads are infallible from the caller's point of view: a record that
//! cannot be decrypted or decoded is reported as absent.

mod encrypted;
mod memory;
mod secure;

pub use encrypted::EncryptedCredentialStore;
pub use memory::MemoryCredentialStore;
pub use secure::SecureCredential;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Longest sanitized prefix kept in a key; the hash suffix disambiguates
const MAX_SANITIZED_LEN: usize = 96;
/// Bytes of the SHA-256 digest appended to the key (8 hex chars)
const KEY_HASH_BYTES: usize = 4;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read credential storage")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write credential storage")]
    WriteFailed(#[source] std::io::Error),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Random number generation failed: {0}")]
    Rng(String),

    #[error("Failed to serialize credential record")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored credential record is unreadable: {0}")]
    Corrupt(String),
}

/// Encrypted key/value storage for passwords
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn save(
        &self,
        server_url: &str,
        username: &str,
        secret: &SecureCredential,
    ) -> Result<(), CredentialError>;

    /// `None` when nothing is stored or the record cannot be decrypted
    async fn get(
        &self,
        server_url: &str,
        username: &str,
    ) -> Option<SecureCredential>;

    async fn clear(
        &self,
        server_url: &str,
        username: &str,
    ) -> Result<(), CredentialError>;

    async fn clear_all(&self) -> Result<(), CredentialError>;
}

/// Storage key for a (server URL, username) pair
///
/// The readable part keeps only `[A-Za-z0-9._-]`, so distinct pairs can
/// sanitize to the same text (`user!` and `user?`). The suffix is a short
/// SHA-256 over the unsanitized pair, which keeps such keys apart.
pub fn credential_key(server_url: &str, username: &str) -> String {
    let combined = format!("{server_url}|{username}");

    let mut sanitized: String = combined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    sanitized.truncate(MAX_SANITIZED_LEN);

    let digest = Sha256::digest(combined.as_bytes());
    let mut out =
        String::with_capacity(sanitized.len() + 1 + KEY_HASH_BYTES * 2);
    out.push_str(&sanitized);
    out.push('_');
    for b in &digest[..KEY_HASH_BYTES] {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
