//! Append-only analysis history.

use crate::{JsonStore, PersistResult};
use async_trait::async_trait;
use hawk_proto::HistoryEntry;
use parking_lot::Mutex;
use std::path::Path;
use tracing::debug;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: HistoryEntry) -> PersistResult<()>;

    /// Up to `limit` entries for `user_id`, newest first.
    async fn query_by_user(&self, user_id: &str, limit: usize) -> PersistResult<Vec<HistoryEntry>>;
}

pub struct JsonHistoryStore {
    store: Option<JsonStore>,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl JsonHistoryStore {
    pub fn open(state_path: &Path) -> Self {
        let store = JsonStore::new(state_path, "history");
        let entries: Vec<HistoryEntry> = store.load();
        debug!(count = entries.len(), "history loaded");
        Self {
            store: Some(store),
            entries: Mutex::new(entries),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            store: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> PersistResult<()> {
        let mut entries = self.entries.lock();
        entries.push(entry);
        match &self.store {
            Some(store) => store.save(&*entries),
            None => Ok(()),
        }
    }

    async fn query_by_user(&self, user_id: &str, limit: usize) -> PersistResult<Vec<HistoryEntry>> {
        let entries = self.entries.lock();
        let mut mine: Vec<HistoryEntry> = entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        mine.truncate(limit);
        Ok(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::make_report;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_query_newest_first_and_limited() {
        let store = JsonHistoryStore::in_memory();
        let base = Utc::now();
        for i in 0..4 {
            let report = make_report(base + Duration::hours(i), i as f64);
            store.append(HistoryEntry::new("alice", report)).await.unwrap();
        }
        store
            .append(HistoryEntry::new("bob", make_report(base, 99.0)))
            .await
            .unwrap();

        let recent = store.query_by_user("alice", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].report.total_savings, 3.0);
        assert_eq!(recent[1].report.total_savings, 2.0);
        assert!(recent.iter().all(|e| e.user_id == "alice"));
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = JsonHistoryStore::open(dir.path());
            store
                .append(HistoryEntry::new("alice", make_report(Utc::now(), 12.5)))
                .await
                .unwrap();
        }
        let reopened = JsonHistoryStore::open(dir.path());
        assert_eq!(reopened.len(), 1);
        let entries = reopened.query_by_user("alice", 10).await.unwrap();
        assert_eq!(entries[0].report.total_savings, 12.5);
    }

    #[tokio::test]
    async fn test_unknown_user_is_empty() {
        let store = JsonHistoryStore::in_memory();
        assert!(store.is_empty());
        assert!(store.query_by_user("nobody", 5).await.unwrap().is_empty());
    }
}
