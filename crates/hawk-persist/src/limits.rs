//! Per-(user, instance) CPU limits.

use crate::{JsonStore, PersistResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hawk_proto::InstanceLimit;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Composite key for a limit record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    pub user_id: String,
    pub instance_id: String,
}

impl LimitKey {
    pub fn new(user_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            instance_id: instance_id.into(),
        }
    }

    fn of(limit: &InstanceLimit) -> Self {
        Self::new(&limit.user_id, &limit.instance_id)
    }
}

#[async_trait]
pub trait LimitStore: Send + Sync {
    /// Insert or replace the limit for its (user, instance).
    async fn upsert(&self, limit: InstanceLimit) -> PersistResult<()>;

    async fn get(&self, user_id: &str, instance_id: &str) -> PersistResult<Option<InstanceLimit>>;

    async fn list_by_user(&self, user_id: &str) -> PersistResult<Vec<InstanceLimit>>;

    /// Returns whether a record was removed.
    async fn delete(&self, user_id: &str, instance_id: &str) -> PersistResult<bool>;

    /// Bump `breach_count` and set `last_breach_at`. Returns the updated
    /// record, or `None` if no limit exists.
    async fn increment_breach(
        &self,
        user_id: &str,
        instance_id: &str,
        at: DateTime<Utc>,
    ) -> PersistResult<Option<InstanceLimit>>;
}

pub struct JsonLimitStore {
    store: Option<JsonStore>,
    limits: Mutex<HashMap<LimitKey, InstanceLimit>>,
}

impl JsonLimitStore {
    pub fn open(state_path: &Path) -> Self {
        let store = JsonStore::new(state_path, "limits");
        // On disk the records are a flat list; the key lives inside each record.
        let records: Vec<InstanceLimit> = store.load();
        debug!(count = records.len(), "instance limits loaded");
        let limits = records.into_iter().map(|l| (LimitKey::of(&l), l)).collect();
        Self {
            store: Some(store),
            limits: Mutex::new(limits),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            store: None,
            limits: Mutex::new(HashMap::new()),
        }
    }

    fn persist(&self, limits: &HashMap<LimitKey, InstanceLimit>) -> PersistResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut records: Vec<&InstanceLimit> = limits.values().collect();
        records.sort_by(|a, b| {
            (a.user_id.as_str(), a.instance_id.as_str())
                .cmp(&(b.user_id.as_str(), b.instance_id.as_str()))
        });
        store.save(&records)
    }
}

#[async_trait]
impl LimitStore for JsonLimitStore {
    async fn upsert(&self, limit: InstanceLimit) -> PersistResult<()> {
        let mut limits = self.limits.lock();
        limits.insert(LimitKey::of(&limit), limit);
        self.persist(&limits)
    }

    async fn get(&self, user_id: &str, instance_id: &str) -> PersistResult<Option<InstanceLimit>> {
        Ok(self
            .limits
            .lock()
            .get(&LimitKey::new(user_id, instance_id))
            .cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> PersistResult<Vec<InstanceLimit>> {
        let mut mine: Vec<InstanceLimit> = self
            .limits
            .lock()
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(mine)
    }

    async fn delete(&self, user_id: &str, instance_id: &str) -> PersistResult<bool> {
        let mut limits = self.limits.lock();
        let removed = limits.remove(&LimitKey::new(user_id, instance_id)).is_some();
        if removed {
            self.persist(&limits)?;
        }
        Ok(removed)
    }

    async fn increment_breach(
        &self,
        user_id: &str,
        instance_id: &str,
        at: DateTime<Utc>,
    ) -> PersistResult<Option<InstanceLimit>> {
        let mut limits = self.limits.lock();
        let updated = match limits.get_mut(&LimitKey::new(user_id, instance_id)) {
            Some(limit) => {
                limit.breach_count += 1;
                limit.last_breach_at = Some(at);
                limit.updated_at = at;
                limit.clone()
            }
            None => return Ok(None),
        };
        self.persist(&limits)?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = JsonLimitStore::in_memory();
        store.upsert(InstanceLimit::new("u1", "i-1", 80.0, true)).await.unwrap();
        store.increment_breach("u1", "i-1", Utc::now()).await.unwrap();
        store.upsert(InstanceLimit::new("u1", "i-1", 60.0, false)).await.unwrap();

        let limit = store.get("u1", "i-1").await.unwrap().expect("limit");
        assert_eq!(limit.cpu_limit_pct, 60.0);
        assert!(!limit.auto_shutdown);
        assert_eq!(limit.breach_count, 0);
    }

    #[tokio::test]
    async fn test_composite_key_does_not_collide() {
        // "ab" + "c" and "a" + "bc" must be distinct records.
        let store = JsonLimitStore::in_memory();
        store.upsert(InstanceLimit::new("ab", "c", 10.0, true)).await.unwrap();
        store.upsert(InstanceLimit::new("a", "bc", 20.0, true)).await.unwrap();
        assert_eq!(store.get("ab", "c").await.unwrap().unwrap().cpu_limit_pct, 10.0);
        assert_eq!(store.get("a", "bc").await.unwrap().unwrap().cpu_limit_pct, 20.0);
    }

    #[tokio::test]
    async fn test_increment_breach() {
        let store = JsonLimitStore::in_memory();
        store.upsert(InstanceLimit::new("u1", "i-1", 50.0, true)).await.unwrap();
        let at = Utc::now();
        store.increment_breach("u1", "i-1", at).await.unwrap();
        let updated = store.increment_breach("u1", "i-1", at).await.unwrap().unwrap();
        assert_eq!(updated.breach_count, 2);
        assert_eq!(updated.last_breach_at, Some(at));

        assert!(store.increment_breach("u1", "i-404", at).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = JsonLimitStore::in_memory();
        store.upsert(InstanceLimit::new("u1", "i-2", 50.0, true)).await.unwrap();
        store.upsert(InstanceLimit::new("u1", "i-1", 50.0, true)).await.unwrap();
        store.upsert(InstanceLimit::new("u2", "i-3", 50.0, true)).await.unwrap();

        let mine = store.list_by_user("u1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].instance_id, "i-1");

        assert!(store.delete("u1", "i-1").await.unwrap());
        assert!(!store.delete("u1", "i-1").await.unwrap());
        assert_eq!(store.list_by_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_limits_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = JsonLimitStore::open(dir.path());
            store.upsert(InstanceLimit::new("u1", "i-1", 75.0, false)).await.unwrap();
        }
        let reopened = JsonLimitStore::open(dir.path());
        let limit = reopened.get("u1", "i-1").await.unwrap().expect("persisted");
        assert_eq!(limit.cpu_limit_pct, 75.0);
    }
}
