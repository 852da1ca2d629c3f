//! Per-user cloud credentials.

use crate::{JsonStore, PersistResult};
use async_trait::async_trait;
use hawk_proto::StoredCredentials;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn get(&self, user_id: &str) -> PersistResult<Option<StoredCredentials>>;

    async fn upsert(&self, credentials: StoredCredentials) -> PersistResult<()>;

    async fn delete(&self, user_id: &str) -> PersistResult<bool>;
}

pub struct JsonCredentialVault {
    store: Option<JsonStore>,
    entries: Mutex<HashMap<String, StoredCredentials>>,
}

impl JsonCredentialVault {
    pub fn open(state_path: &Path) -> Self {
        let store = JsonStore::new(state_path, "credentials");
        let entries = store.load();
        Self {
            store: Some(store),
            entries: Mutex::new(entries),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            store: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn persist(&self, entries: &HashMap<String, StoredCredentials>) -> PersistResult<()> {
        match &self.store {
            Some(store) => store.save(entries),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CredentialVault for JsonCredentialVault {
    async fn get(&self, user_id: &str) -> PersistResult<Option<StoredCredentials>> {
        Ok(self.entries.lock().get(user_id).cloned())
    }

    async fn upsert(&self, credentials: StoredCredentials) -> PersistResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(credentials.user_id.clone(), credentials);
        self.persist(&entries)
    }

    async fn delete(&self, user_id: &str) -> PersistResult<bool> {
        let mut entries = self.entries.lock();
        let removed = entries.remove(user_id).is_some();
        if removed {
            self.persist(&entries)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hawk_proto::AwsCredentials;

    fn make_stored(user: &str, key: &str) -> StoredCredentials {
        StoredCredentials {
            user_id: user.to_string(),
            credentials: AwsCredentials::new(key, "secret"),
            account_id: Some("123456789012".to_string()),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let vault = JsonCredentialVault::in_memory();
        vault.upsert(make_stored("u1", "AKIA1")).await.unwrap();
        vault.upsert(make_stored("u1", "AKIA2")).await.unwrap();

        let stored = vault.get("u1").await.unwrap().expect("stored");
        assert_eq!(stored.credentials.access_key_id, "AKIA2");

        assert!(vault.delete("u1").await.unwrap());
        assert!(vault.get("u1").await.unwrap().is_none());
        assert!(!vault.delete("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_vault_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let vault = JsonCredentialVault::open(dir.path());
            vault.upsert(make_stored("u1", "AKIA1")).await.unwrap();
        }
        let reopened = JsonCredentialVault::open(dir.path());
        let stored = reopened.get("u1").await.unwrap().expect("persisted");
        assert_eq!(stored.account_id.as_deref(), Some("123456789012"));
    }
}
