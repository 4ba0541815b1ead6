use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    CredentialError, CredentialStore, SecureCredential, credential_key,
};

/// Process-local credential store
///
/// Used for `--ephemeral` runs and in tests. Nothing touches disk.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, SecureCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(
        &self,
        server_url: &str,
        username: &str,
        secret: &SecureCredential,
    ) -> Result<(), CredentialError> {
        self.records
            .write()
            .insert(credential_key(server_url, username), secret.clone());
        Ok(())
    }

    async fn get(
        &self,
        server_url: &str,
        username: &str,
    ) -> Option<SecureCredential> {
        self.records
            .read()
            .get(&credential_key(server_url, username))
            .cloned()
    }

    async fn clear(
        &self,
        server_url: &str,
        username: &str,
    ) -> Result<(), CredentialError> {
        self.records
            .write()
            .remove(&credential_key(server_url, username));
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), CredentialError> {
        self.records.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pairs_are_isolated() {
        let store = MemoryCredentialStore::new();
        store
            .save("http://a", "user!", &SecureCredential::from("one"))
            .await
            .unwrap();
        store
            .save("http://a", "user?", &SecureCredential::from("two"))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("http://a", "user!").await.unwrap().expose_secret(),
            "one"
        );
        assert_eq!(
            store.get("http://a", "user?").await.unwrap().expose_secret(),
            "two"
        );

        store.clear("http://a", "user!").await.unwrap();
        assert!(store.get("http://a", "user!").await.is_none());
        store.clear_all().await.unwrap();
        assert!(store.is_empty());
    }
}
