//! TTL cache of the model ids a key can use.

use crate::{LlmProvider, LlmResult};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct Entry {
    models: Vec<String>,
    fetched_at: Instant,
}

/// Owned by one router; a fresh instance starts empty.
#[derive(Debug)]
pub struct ModelCache {
    ttl: Duration,
    entry: Mutex<Option<Entry>>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached models, if fetched less than `ttl` ago.
    pub fn get(&self) -> Option<Vec<String>> {
        self.get_at(Instant::now())
    }

    pub fn get_at(&self, now: Instant) -> Option<Vec<String>> {
        let entry = self.entry.lock();
        entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.fetched_at) < self.ttl)
            .map(|e| e.models.clone())
    }

    /// Empty lists are ignored so a bad discovery never hides a good one.
    pub fn store(&self, models: Vec<String>) {
        self.store_at(models, Instant::now());
    }

    pub fn store_at(&self, models: Vec<String>, now: Instant) {
        if models.is_empty() {
            return;
        }
        *self.entry.lock() = Some(Entry {
            models,
            fetched_at: now,
        });
    }

    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }

    /// Ask the provider for its models and cache a non-empty answer.
    pub async fn refresh(&self, provider: &dyn LlmProvider) -> LlmResult<Vec<String>> {
        let models = provider.list_models().await?;
        info!(provider = provider.name(), count = models.len(), "model list refreshed");
        self.store(models.clone());
        Ok(models)
    }

    /// Cached list when fresh, otherwise a refresh.
    pub async fn get_or_refresh(&self, provider: &dyn LlmProvider) -> LlmResult<Vec<String>> {
        if let Some(models) = self.get() {
            debug!(count = models.len(), "model list cache hit");
            return Ok(models);
        }
        self.refresh(provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        models: Vec<String>,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn list_models(&self) -> LlmResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.models.clone())
        }

        async fn generate(&self, _: &str, _: &str, _: &GenerationConfig) -> LlmResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_expires_after_ttl() {
        let cache = ModelCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache.store_at(vec!["gemini-pro".into()], t0);
        assert!(cache.get_at(t0 + Duration::from_secs(299)).is_some());
        assert!(cache.get_at(t0 + Duration::from_secs(300)).is_none());
    }

    #[test]
    fn test_empty_list_not_cached() {
        let cache = ModelCache::default();
        cache.store(vec!["a".into()]);
        cache.store(vec![]);
        assert_eq!(cache.get(), Some(vec!["a".to_string()]));
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn test_refresh_only_when_stale() {
        let provider = CountingProvider {
            models: vec!["gemini-1.5-flash".into()],
            ..Default::default()
        };
        let cache = ModelCache::default();
        cache.get_or_refresh(&provider).await.unwrap();
        cache.get_or_refresh(&provider).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let zero = ModelCache::new(Duration::ZERO);
        zero.get_or_refresh(&provider).await.unwrap();
        zero.get_or_refresh(&provider).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
