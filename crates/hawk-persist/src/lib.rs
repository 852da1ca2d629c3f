//! JSON file-backed persistence for CostHawk.
//!
//! Provides [`JsonStore`], a single-document store that snapshots to a JSON
//! file on every write, and the three stores the analyzer and the limit
//! monitor rely on:
//!
//! - [`HistoryStore`]: append-only analysis history, queried newest first
//! - [`LimitStore`]: per-(user, instance) CPU limits with breach counters
//! - [`CredentialVault`]: per-user cloud credentials
//!
//! Each store also has an in-memory mode (no file) for tests and dry runs.

#![forbid(unsafe_code)]

pub mod history;
pub mod limits;
pub mod vault;

pub use history::{HistoryStore, JsonHistoryStore};
pub use limits::{JsonLimitStore, LimitKey, LimitStore};
pub use vault::{CredentialVault, JsonCredentialVault};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// A JSON file holding one document for a single domain of data.
///
/// Lives at `{state_path}/state/{domain}.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(state_path: &Path, domain: &str) -> Self {
        let path = state_path.join("state").join(format!("{domain}.json"));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing or corrupt file yields `T::default()`.
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "corrupt state file, starting fresh");
                T::default()
            }),
            Err(_) => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                T::default()
            }
        }
    }

    /// Write the document, creating parent directories as needed.
    pub fn save<T: Serialize>(&self, data: &T) -> PersistResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, content).map_err(|source| PersistError::Io {
            path: self.path.clone(),
            source,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_json_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "test");

        let mut data = HashMap::new();
        data.insert("key1".to_string(), 1u32);
        data.insert("key2".to_string(), 2u32);
        store.save(&data).expect("save");

        let loaded: HashMap<String, u32> = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("key1"), Some(&1));
    }

    #[test]
    fn test_json_store_missing_file_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "nonexistent");
        let loaded: Vec<String> = store.load();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_json_store_corrupt_file_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&state_dir).expect("mkdir");
        std::fs::write(state_dir.join("corrupt.json"), "not json").expect("write");

        let store = JsonStore::new(dir.path(), "corrupt");
        let loaded: Vec<String> = store.load();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_json_store_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deep_path = dir.path().join("a").join("b");
        let store = JsonStore::new(&deep_path, "deep");
        store.save(&vec!["v".to_string()]).expect("save with nested dirs");
        assert!(store.path().exists());
    }
}
